//! Key acquisition: turns raw key material into the 32-byte cipher key.
//!
//! This is the only place where key length is validated. The engine only ever
//! sees an [`Aes256Key32`].

use crate::aliases::Aes256Key32;
use crate::consts::AES_KEY_LENGTH;
use crate::error::CryptionError;
use crate::key_source::KeySource;
use tracing::debug;

/// Read `source` once and cut its material down to an AES-256 key.
///
/// Material shorter than [`AES_KEY_LENGTH`] is a [`CryptionError::Config`];
/// anything past the first 32 bytes is ignored. The intermediate material is
/// a secure buffer and is wiped when this function returns, whichever way.
pub fn load_cipher_key(source: &dyn KeySource) -> Result<Aes256Key32, CryptionError> {
    let material = source.read_key()?;
    cipher_key_from_bytes(material.expose_secret())
}

/// Validate `bytes` and copy the first 32 into a fresh secure key.
pub fn cipher_key_from_bytes(bytes: &[u8]) -> Result<Aes256Key32, CryptionError> {
    if bytes.len() < AES_KEY_LENGTH {
        return Err(CryptionError::Config(format!(
            "key must be at least {AES_KEY_LENGTH} bytes for AES-256 (got {})",
            bytes.len()
        )));
    }
    if bytes.len() > AES_KEY_LENGTH {
        debug!(
            supplied = bytes.len(),
            "key material longer than {AES_KEY_LENGTH} bytes; using prefix"
        );
    }

    let mut key = Aes256Key32::new([0u8; AES_KEY_LENGTH]);
    key.expose_secret_mut()
        .copy_from_slice(&bytes[..AES_KEY_LENGTH]);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_source::StaticKeySource;

    #[test]
    fn sixteen_byte_key_is_config_error() {
        let err = cipher_key_from_bytes(&[7u8; 16]).unwrap_err();
        assert!(matches!(err, CryptionError::Config(_)));
    }

    #[test]
    fn only_first_32_bytes_are_used() {
        let mut material = vec![1u8; 32];
        material.extend_from_slice(&[9u8; 8]);
        let key = cipher_key_from_bytes(&material).unwrap();
        assert_eq!(key.expose_secret(), &[1u8; 32]);
    }

    #[test]
    fn loads_through_key_source() {
        let source = StaticKeySource::new(b"0123456789abcdef0123456789abcdef".to_vec());
        let key = load_cipher_key(&source).unwrap();
        assert_eq!(&key.expose_secret()[..], b"0123456789abcdef0123456789abcdef");
    }
}

//! # Cryption engine
//!
//! Applies one [`TaskDescriptor`] to the file it names, using the on-disk
//! layout:
//!
//! ```text
//! bytes[0..16]  = IV (random per encryption, not secret)
//! bytes[16..]   = AES-256-CBC ciphertext of the original file, PKCS#7 padded
//! ```
//!
//! Plaintext files carry no header. The result is written straight back over
//! the original path: there is no temporary file or rename, so a crash in the
//! middle of the write can leave the file truncated.

use crate::aliases::{Aes256Key32, Iv16};
use crate::consts::IV_LENGTH;
use crate::crypto::SecureRandomExt;
use crate::decryptor::decrypt;
use crate::encryptor::encrypt;
use crate::error::CryptionError;
use crate::task::{Action, TaskDescriptor};
use std::fs;
use tracing::debug;

/// Run one task against the filesystem.
///
/// `key` has already been validated by the caller; the engine never reads a
/// key source.
pub fn execute_task(task: &TaskDescriptor, key: &Aes256Key32) -> Result<(), CryptionError> {
    let input = fs::read(task.path())?;
    let output = match task.action() {
        Action::Encrypt => seal(&input, key)?,
        Action::Decrypt => open(&input, key)?,
    };
    fs::write(task.path(), &output)?;

    debug!(
        path = task.path_str(),
        action = %task.action(),
        bytes_in = input.len(),
        bytes_out = output.len(),
        "task complete"
    );
    Ok(())
}

/// Encrypt `plaintext` under a fresh random IV and return `IV || ciphertext`.
pub fn seal(plaintext: &[u8], key: &Aes256Key32) -> Result<Vec<u8>, CryptionError> {
    let iv = Iv16::try_random()?;
    let ciphertext = encrypt(plaintext, key, &iv);

    let mut out = Vec::with_capacity(IV_LENGTH + ciphertext.len());
    out.extend_from_slice(iv.expose_secret());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Split `IV || ciphertext` and decrypt it.
///
/// # Errors
///
/// [`CryptionError::Format`] if `sealed` is shorter than the IV, otherwise
/// whatever [`decrypt`] reports.
pub fn open(sealed: &[u8], key: &Aes256Key32) -> Result<Vec<u8>, CryptionError> {
    if sealed.len() < IV_LENGTH {
        return Err(CryptionError::Format(format!(
            "ciphertext file is {} bytes; needs at least a {IV_LENGTH}-byte IV",
            sealed.len()
        )));
    }

    let (iv_bytes, body) = sealed.split_at(IV_LENGTH);
    let mut iv = Iv16::new([0u8; IV_LENGTH]);
    iv.expose_secret_mut().copy_from_slice(iv_bytes);

    decrypt(body, key, &iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Aes256Key32 {
        Aes256Key32::new(*b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn seal_open_roundtrip() {
        let sealed = seal(b"hello world", &key()).unwrap();
        assert_eq!(sealed.len(), 32);
        assert_eq!(open(&sealed, &key()).unwrap(), b"hello world");
    }

    #[test]
    fn open_short_input_is_format_error() {
        for len in [0usize, 1, 15] {
            let err = open(&vec![0u8; len], &key()).unwrap_err();
            assert!(matches!(err, CryptionError::Format(_)), "len {len}");
        }
    }

    #[test]
    fn open_bare_iv_is_integrity_error() {
        // IV present but no ciphertext blocks at all
        let err = open(&[0u8; 16], &key()).unwrap_err();
        assert!(matches!(err, CryptionError::Integrity(_)));
    }
}

//! src/decryptor/decrypt.rs
//! AES-256-CBC decryption with PKCS#7 padding validation.

use crate::aliases::{Aes256Key32, Iv16};
use crate::consts::AES_BLOCK_SIZE;
use crate::error::CryptionError;
use crate::utils::xor_blocks;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes256Dec, Block as AesBlock};

/// Decrypt CBC `ciphertext` under `key` and `iv`, stripping PKCS#7 padding.
///
/// # Errors
///
/// [`CryptionError::Integrity`] if `ciphertext` is empty or not a multiple of
/// 16 bytes, or if the final block does not carry valid padding (which is
/// also what a wrong key almost always produces).
pub fn decrypt(
    ciphertext: &[u8],
    key: &Aes256Key32,
    iv: &Iv16,
) -> Result<Vec<u8>, CryptionError> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptionError::Integrity(format!(
            "ciphertext length {} is not a positive multiple of {AES_BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let cipher = Aes256Dec::new(key.expose_secret().into());
    let mut plaintext = vec![0u8; ciphertext.len()];
    let mut prev_block: &[u8] = iv.expose_secret();

    for (chunk, out) in ciphertext
        .chunks_exact(AES_BLOCK_SIZE)
        .zip(plaintext.chunks_exact_mut(AES_BLOCK_SIZE))
    {
        let mut aes_block = *AesBlock::from_slice(chunk);
        cipher.decrypt_block(&mut aes_block);
        xor_blocks(aes_block.as_slice(), prev_block, out);
        prev_block = chunk;
    }

    match pkcs7_unpadded_len(&plaintext) {
        Some(len) => {
            plaintext.truncate(len);
            Ok(plaintext)
        }
        None => {
            plaintext.fill(0);
            Err(CryptionError::Integrity("invalid PKCS#7 padding".into()))
        }
    }
}

/// Validate the padding on the last block of `plaintext` and return the
/// length of the data in front of it.
fn pkcs7_unpadded_len(plaintext: &[u8]) -> Option<usize> {
    let last_block = &plaintext[plaintext.len() - AES_BLOCK_SIZE..];
    let padding = last_block[AES_BLOCK_SIZE - 1];

    // Range check on the padding value itself can exit early
    if padding == 0 || padding as usize > AES_BLOCK_SIZE {
        return None;
    }

    // Compare every padding byte without short-circuiting
    let padding_start = AES_BLOCK_SIZE - padding as usize;
    let diff = last_block[padding_start..]
        .iter()
        .fold(0u8, |acc, &b| acc | (b ^ padding));

    (diff == 0).then(|| plaintext.len() - padding as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryptor::encrypt;

    fn key() -> Aes256Key32 {
        Aes256Key32::new([0x42u8; 32])
    }

    #[test]
    fn roundtrip_block_boundaries() {
        let iv = Iv16::new([9u8; 16]);
        for len in [0usize, 1, 15, 16, 17, 31, 32, 1000] {
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let ciphertext = encrypt(&plaintext, &key(), &iv);
            assert_eq!(decrypt(&ciphertext, &key(), &iv).unwrap(), plaintext);
        }
    }

    #[test]
    fn unaligned_ciphertext_is_integrity_error() {
        let iv = Iv16::new([0u8; 16]);
        for bad in [&[][..], &[0u8; 15][..], &[0u8; 17][..]] {
            let err = decrypt(bad, &key(), &iv).unwrap_err();
            assert!(matches!(err, CryptionError::Integrity(_)));
        }
    }

    #[test]
    fn padding_validation() {
        let mut block = [0u8; 16];
        assert_eq!(pkcs7_unpadded_len(&block), None);

        block[15] = 17;
        assert_eq!(pkcs7_unpadded_len(&block), None);

        block[12..].fill(4);
        assert_eq!(pkcs7_unpadded_len(&block), Some(12));

        block[13] = 3;
        assert_eq!(pkcs7_unpadded_len(&block), None);

        let full = [16u8; 16];
        assert_eq!(pkcs7_unpadded_len(&full), Some(0));
    }
}

//! src/encryptor/encrypt.rs
//! AES-256-CBC encryption with PKCS#7 padding over an in-memory buffer.

use crate::aliases::{Aes256Key32, Block16, Iv16};
use crate::consts::AES_BLOCK_SIZE;
use crate::utils::{padded_len, xor_blocks};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256Enc, Block as AesBlock};

/// Encrypt `plaintext` with AES-256-CBC under `key` and `iv`.
///
/// The output is `plaintext.len()` rounded up to the next multiple of 16, and
/// always at least one byte longer: an aligned input gains a full padding
/// block. Deterministic for a given key and IV, so callers must use a fresh
/// random IV per file.
#[must_use]
pub fn encrypt(plaintext: &[u8], key: &Aes256Key32, iv: &Iv16) -> Vec<u8> {
    let cipher = Aes256Enc::new(key.expose_secret().into());
    let mut ciphertext = Vec::with_capacity(padded_len(plaintext.len()));

    // previous ciphertext block, seeded with the IV
    let mut prev_block: [u8; AES_BLOCK_SIZE] = *iv.expose_secret();
    let mut plaintext_block = Block16::new([0u8; AES_BLOCK_SIZE]);
    let mut xor_output = Block16::new([0u8; AES_BLOCK_SIZE]);

    let mut chunks = plaintext.chunks_exact(AES_BLOCK_SIZE);
    for chunk in &mut chunks {
        plaintext_block.expose_secret_mut().copy_from_slice(chunk);
        encrypt_block(
            &cipher,
            &plaintext_block,
            &mut xor_output,
            &mut prev_block,
        );
        ciphertext.extend_from_slice(&prev_block);
    }

    // Final block: remainder + PKCS#7 padding (a full block of 0x10 when aligned)
    let tail = chunks.remainder();
    let pad = (AES_BLOCK_SIZE - tail.len()) as u8;
    {
        let block = plaintext_block.expose_secret_mut();
        block[..tail.len()].copy_from_slice(tail);
        block[tail.len()..].fill(pad);
    }
    encrypt_block(
        &cipher,
        &plaintext_block,
        &mut xor_output,
        &mut prev_block,
    );
    ciphertext.extend_from_slice(&prev_block);

    ciphertext
}

/// One CBC step: `prev = E(plain ^ prev)`.
#[inline(always)]
fn encrypt_block(
    cipher: &Aes256Enc,
    plaintext_block: &Block16,
    xor_output: &mut Block16,
    prev_block: &mut [u8; AES_BLOCK_SIZE],
) {
    xor_blocks(
        plaintext_block.expose_secret(),
        prev_block,
        xor_output.expose_secret_mut(),
    );
    let mut aes_block = AesBlock::from(*xor_output.expose_secret());
    cipher.encrypt_block(&mut aes_block);
    prev_block.copy_from_slice(aes_block.as_slice());
}

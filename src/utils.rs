//! Utility functions used across the library.

use crate::consts::AES_BLOCK_SIZE;

/// XORs two 16-byte blocks and writes the result to `output`.
///
/// Used for CBC chaining in both directions.
///
/// # Panics (by contract)
///
/// Panics if any argument is shorter than 16 bytes. All callers pass
/// exact-size blocks.
#[inline(always)]
pub const fn xor_blocks(block_a: &[u8], block_b: &[u8], output: &mut [u8]) {
    let mut i = 0;
    while i < AES_BLOCK_SIZE {
        output[i] = block_a[i] ^ block_b[i];
        i += 1;
    }
}

/// Length of `plaintext_len` bytes after PKCS#7 padding.
///
/// Always adds between 1 and 16 bytes, so an aligned input gains a full block.
#[inline]
#[must_use]
pub const fn padded_len(plaintext_len: usize) -> usize {
    (plaintext_len / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE
}

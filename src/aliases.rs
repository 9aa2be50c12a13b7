//! # Secure-Gate Type Aliases
//!
//! Secret-bearing buffers used by the cipher and the key sources. Every type
//! here zeroizes itself on drop, so key bytes are wiped on every exit path
//! (success, error, early return or unwinding) without explicit clearing.
//!
//! All types require `.expose_secret()` / `.expose_secret_mut()` to reach the
//! underlying bytes.

use crate::consts::{AES_BLOCK_SIZE, AES_KEY_LENGTH, IV_LENGTH};

// ─────────────────────────────────────────────────────────────────────────────
// Fixed-size buffers
// ─────────────────────────────────────────────────────────────────────────────
pub type SpanBuffer<const N: usize> = secure_gate::Fixed<[u8; N]>;

pub type Aes256Key32 = SpanBuffer<AES_KEY_LENGTH>; // cipher key
pub type Iv16 = SpanBuffer<IV_LENGTH>; // per-file IV (not secret, wiped anyway)
pub type Block16 = SpanBuffer<AES_BLOCK_SIZE>; // one AES block of plaintext

// ─────────────────────────────────────────────────────────────────────────────
// Dynamic secrets
// ─────────────────────────────────────────────────────────────────────────────

/// Raw key material as returned by a [`KeySource`](crate::key_source::KeySource),
/// before it is validated and cut down to an [`Aes256Key32`].
pub type KeyMaterial = secure_gate::Dynamic<Vec<u8>>;

// src/decryptor/mod.rs

//! Decryption half of the cipher.
//!
//! Core API: `decrypt(ciphertext, &key, &iv)?` → plaintext, failing closed on
//! bad padding or misaligned input.

pub(crate) mod decrypt;

pub use decrypt::decrypt;

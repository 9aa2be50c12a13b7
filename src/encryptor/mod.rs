// src/encryptor/mod.rs

//! Encryption half of the cipher.
//!
//! Core API: `encrypt(plaintext, &key, &iv)` → CBC ciphertext (no IV prefix;
//! the on-disk layout is owned by [`engine`](crate::engine)).

pub(crate) mod encrypt;

pub use encrypt::encrypt;

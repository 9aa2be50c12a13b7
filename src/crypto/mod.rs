// src/crypto/mod.rs

//! Low-level crypto support: key loading and secure randomness.
//!
//! The block transform itself lives in [`encryptor`](crate::encryptor) and
//! [`decryptor`](crate::decryptor).

pub mod key;
pub mod rng;

pub use key::{cipher_key_from_bytes, load_cipher_key};
pub use rng::SecureRandomExt;

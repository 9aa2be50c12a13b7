// src/crypto/rng.rs
//! Secure randomness for fixed-size buffers.
//!
//! Adds `T::try_random()` to every `Fixed<[u8; N]>` alias (`Iv16`, `Aes256Key32`, …)
//! backed by the operating system RNG. A failing RNG is an error, never a
//! silently zeroed IV.

use crate::error::CryptionError;
use rand::{rngs::OsRng, TryRngCore};
use secure_gate::Fixed;

/// Extension trait – gives `.try_random()` to all fixed-size secret types
pub trait SecureRandomExt: Sized {
    /// Generate a cryptographically secure random instance of this type
    fn try_random() -> Result<Self, CryptionError>;
}

impl<const N: usize> SecureRandomExt for Fixed<[u8; N]> {
    #[inline]
    fn try_random() -> Result<Self, CryptionError> {
        let mut value = Fixed::new([0u8; N]);
        OsRng
            .try_fill_bytes(value.expose_secret_mut())
            .map_err(|e| CryptionError::Io(std::io::Error::other(e)))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::Iv16;

    #[test]
    fn random_ivs_differ() {
        let a = Iv16::try_random().unwrap();
        let b = Iv16::try_random().unwrap();
        assert_ne!(a.expose_secret(), b.expose_secret());
    }
}

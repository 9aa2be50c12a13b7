//! # Key sources
//!
//! Where the master secret comes from. A dispatcher reads its source exactly
//! once per batch and immediately narrows the material to a 32-byte key with
//! [`load_cipher_key`](crate::crypto::load_cipher_key); the returned
//! [`KeyMaterial`] is wiped when dropped.

use crate::aliases::KeyMaterial;
use crate::consts::{KEY_ENV_VAR, MAX_KEY_STREAM_LEN};
use crate::error::CryptionError;
use parking_lot::Mutex;
use std::io::Read;
use std::path::PathBuf;

/// Supplies the raw secret for a batch.
pub trait KeySource: Send + Sync {
    /// Return the current key material.
    ///
    /// A missing secret is a [`CryptionError::Config`]. Length is checked by
    /// the caller.
    fn read_key(&self) -> Result<KeyMaterial, CryptionError>;
}

/// Reads the key from an environment variable (default `CRYPTION_KEY`).
#[derive(Debug, Clone)]
pub struct EnvKeySource {
    var: String,
}

impl EnvKeySource {
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvKeySource {
    fn default() -> Self {
        Self::new(KEY_ENV_VAR)
    }
}

impl KeySource for EnvKeySource {
    fn read_key(&self) -> Result<KeyMaterial, CryptionError> {
        let value = std::env::var(&self.var).map_err(|e| {
            CryptionError::Config(format!("key variable {} unavailable: {e}", self.var))
        })?;
        Ok(KeyMaterial::new(value.into_bytes()))
    }
}

/// Reads `VAR=value` from a `.env`-style file.
///
/// Blank lines and `#` comments are skipped, an optional `export ` prefix is
/// accepted, and one layer of matching single or double quotes is stripped
/// from the value.
#[derive(Debug, Clone)]
pub struct EnvFileKeySource {
    path: PathBuf,
    var: String,
}

impl EnvFileKeySource {
    /// Read [`KEY_ENV_VAR`] from the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            var: KEY_ENV_VAR.to_owned(),
        }
    }

    #[must_use]
    pub fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = var.into();
        self
    }
}

impl KeySource for EnvFileKeySource {
    fn read_key(&self) -> Result<KeyMaterial, CryptionError> {
        let contents = KeyMaterial::new(std::fs::read(&self.path).map_err(|e| {
            CryptionError::Config(format!("cannot read key file {}: {e}", self.path.display()))
        })?);
        let text = std::str::from_utf8(contents.expose_secret()).map_err(|_| {
            CryptionError::Config(format!("key file {} is not UTF-8", self.path.display()))
        })?;

        find_env_value(text, &self.var)
            .map(|value| KeyMaterial::new(value.as_bytes().to_vec()))
            .ok_or_else(|| {
                CryptionError::Config(format!(
                    "{} not set in {}",
                    self.var,
                    self.path.display()
                ))
            })
    }
}

fn find_env_value<'a>(text: &'a str, var: &str) -> Option<&'a str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (name, value) = line.split_once('=')?;
            (name.trim() == var).then(|| unquote(value.trim()))
        })
        .last()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// A fixed secret held in a secure buffer. For embedding and tests.
pub struct StaticKeySource {
    material: KeyMaterial,
}

impl StaticKeySource {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            material: KeyMaterial::new(bytes),
        }
    }
}

impl KeySource for StaticKeySource {
    fn read_key(&self) -> Result<KeyMaterial, CryptionError> {
        Ok(KeyMaterial::new(self.material.expose_secret().clone()))
    }
}

/// Reads the whole key from a byte stream, once.
///
/// At most [`MAX_KEY_STREAM_LEN`] bytes are accepted; a longer stream is a
/// [`CryptionError::Config`].
///
/// Worker processes receive their key this way on stdin, so it never shows up
/// in argv or the environment.
pub struct ReaderKeySource<R> {
    reader: Mutex<Option<R>>,
}

impl<R: Read + Send> ReaderKeySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
        }
    }
}

impl<R: Read + Send> KeySource for ReaderKeySource<R> {
    fn read_key(&self) -> Result<KeyMaterial, CryptionError> {
        let mut reader = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| CryptionError::Config("key stream already consumed".into()))?;
        // Sized up front: the secret is read in place and never reallocated.
        let mut material = KeyMaterial::new(vec![0u8; MAX_KEY_STREAM_LEN + 1]);
        let filled = read_into(&mut reader, material.expose_secret_mut())?;
        if filled == 0 {
            return Err(CryptionError::Config("key stream was empty".into()));
        }
        if filled > MAX_KEY_STREAM_LEN {
            return Err(CryptionError::Config(format!(
                "key stream longer than {MAX_KEY_STREAM_LEN} bytes"
            )));
        }
        material.expose_secret_mut().truncate(filled);
        Ok(material)
    }
}

/// Fill `buf` from `reader` until EOF or the buffer is full.
fn read_into(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, CryptionError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

//! # Task descriptors
//!
//! A [`TaskDescriptor`] is one unit of work: a file path plus the action to
//! apply to it. Descriptors cross process boundaries through the shared queue,
//! so they have a fixed, self-delimiting wire form:
//!
//! ```text
//! +-----+----------------+------------------------+
//! | tag | path len (BE)  | path bytes (UTF-8)     |
//! | u8  | u32            | len bytes              |
//! +-----+----------------+------------------------+
//! ```
//!
//! The tag is `b'E'` (encrypt) or `b'D'` (decrypt). Decoding fails closed:
//! any mismatch between the declared and actual length is a
//! [`CryptionError::Format`], never a truncated path.

use crate::consts::{DESCRIPTOR_HEADER_LEN, MAX_DESCRIPTOR_PATH_LEN};
use crate::error::CryptionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const ENCRYPT_TAG: u8 = b'E';
const DECRYPT_TAG: u8 = b'D';

/// What to do with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Encrypt,
    Decrypt,
}

impl Action {
    const fn tag(self) -> u8 {
        match self {
            Action::Encrypt => ENCRYPT_TAG,
            Action::Decrypt => DECRYPT_TAG,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, CryptionError> {
        match tag {
            ENCRYPT_TAG => Ok(Action::Encrypt),
            DECRYPT_TAG => Ok(Action::Decrypt),
            other => Err(CryptionError::Format(format!(
                "unknown action tag 0x{other:02x}"
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Encrypt => f.write_str("encrypt"),
            Action::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Accepts `encrypt`, `decrypt`, `e` or `d`, in any case.
impl FromStr for Action {
    type Err = CryptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "encrypt" | "e" => Ok(Action::Encrypt),
            "decrypt" | "d" => Ok(Action::Decrypt),
            _ => Err(CryptionError::Config(format!(
                "invalid action '{s}': expected 'encrypt', 'decrypt', 'e' or 'd'"
            ))),
        }
    }
}

/// One file plus the action to apply. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskDescriptor {
    action: Action,
    file_path: String,
}

impl TaskDescriptor {
    /// Build a descriptor for `path`.
    ///
    /// The path must be non-empty valid UTF-8 no longer than
    /// [`MAX_DESCRIPTOR_PATH_LEN`] bytes, so that it always fits a queue slot.
    pub fn new(action: Action, path: impl AsRef<Path>) -> Result<Self, CryptionError> {
        let path = path.as_ref();
        let file_path = path
            .to_str()
            .ok_or_else(|| {
                CryptionError::Format(format!("path is not valid UTF-8: {}", path.display()))
            })?
            .to_owned();
        validate_path(&file_path)?;
        Ok(Self { action, file_path })
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        Path::new(&self.file_path)
    }

    #[must_use]
    pub fn path_str(&self) -> &str {
        &self.file_path
    }

    /// Length of [`encode`](Self::encode)'s output.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        DESCRIPTOR_HEADER_LEN + self.file_path.len()
    }

    /// Serialize to the wire form described in the module docs.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Append the wire form to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        // validate_path bounds the length well below u32::MAX
        let len = self.file_path.len() as u32;
        out.push(self.action.tag());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(self.file_path.as_bytes());
    }

    /// Parse exactly one record. Trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptionError> {
        if bytes.len() < DESCRIPTOR_HEADER_LEN {
            return Err(CryptionError::Format(format!(
                "descriptor too short: {} bytes",
                bytes.len()
            )));
        }

        let action = Action::from_tag(bytes[0])?;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[1..DESCRIPTOR_HEADER_LEN]);
        let declared = u32::from_be_bytes(len_bytes) as usize;

        let body = &bytes[DESCRIPTOR_HEADER_LEN..];
        if body.len() != declared {
            return Err(CryptionError::Format(format!(
                "descriptor declares {declared} path bytes but carries {}",
                body.len()
            )));
        }

        let file_path = std::str::from_utf8(body)
            .map_err(|e| CryptionError::Format(format!("descriptor path is not UTF-8: {e}")))?
            .to_owned();
        validate_path(&file_path)?;

        Ok(Self { action, file_path })
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.file_path)
    }
}

fn validate_path(path: &str) -> Result<(), CryptionError> {
    if path.is_empty() {
        return Err(CryptionError::Format("file path is empty".into()));
    }
    if path.len() > MAX_DESCRIPTOR_PATH_LEN {
        return Err(CryptionError::Format(format!(
            "file path is {} bytes; limit is {MAX_DESCRIPTOR_PATH_LEN}",
            path.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_with_delimiters_survives() {
        let task = TaskDescriptor::new(Action::Decrypt, "dir,with,commas/a,ENCRYPT.txt").unwrap();
        let decoded = TaskDescriptor::decode(&task.encode()).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn wire_layout() {
        let task = TaskDescriptor::new(Action::Encrypt, "a.txt").unwrap();
        assert_eq!(task.encode(), b"E\x00\x00\x00\x05a.txt");
        assert_eq!(task.encoded_len(), 10);
    }

    #[test]
    fn empty_path_rejected() {
        assert!(matches!(
            TaskDescriptor::new(Action::Encrypt, ""),
            Err(CryptionError::Format(_))
        ));
    }

    #[test]
    fn truncated_record_rejected() {
        let mut wire = TaskDescriptor::new(Action::Encrypt, "abc").unwrap().encode();
        wire.pop();
        assert!(matches!(
            TaskDescriptor::decode(&wire),
            Err(CryptionError::Format(_))
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut wire = TaskDescriptor::new(Action::Encrypt, "abc").unwrap().encode();
        wire.push(b'x');
        assert!(TaskDescriptor::decode(&wire).is_err());
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(matches!(
            TaskDescriptor::decode(b"X\x00\x00\x00\x01a"),
            Err(CryptionError::Format(_))
        ));
    }

    #[test]
    fn action_parsing() {
        assert_eq!("E".parse::<Action>().unwrap(), Action::Encrypt);
        assert_eq!("Decrypt".parse::<Action>().unwrap(), Action::Decrypt);
        assert!("shred".parse::<Action>().is_err());
    }
}

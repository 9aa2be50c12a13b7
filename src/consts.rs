//! # Constants
//!
//! Cipher sizes, queue limits and the names of the environment hooks used by
//! the dispatcher and the worker processes.

/// AES-256 key length in bytes. Longer key material is truncated to this.
pub const AES_KEY_LENGTH: usize = 32;

/// AES block length in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Length of the IV stored at the front of every ciphertext file.
pub const IV_LENGTH: usize = 16;

/// Largest key accepted from a byte stream by
/// [`ReaderKeySource`](crate::key_source::ReaderKeySource).
pub const MAX_KEY_STREAM_LEN: usize = 1024;

/// Default number of slots in a task queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Longest file path (in UTF-8 bytes) a task descriptor may carry.
///
/// Bounds the slot size of the cross-process queue.
pub const MAX_DESCRIPTOR_PATH_LEN: usize = 4096;

/// Fixed prefix of a serialized descriptor: one tag byte + u32 length.
pub const DESCRIPTOR_HEADER_LEN: usize = 5;

/// Largest serialized descriptor.
pub const MAX_DESCRIPTOR_LEN: usize = DESCRIPTOR_HEADER_LEN + MAX_DESCRIPTOR_PATH_LEN;

/// Environment variable read by [`EnvKeySource`](crate::key_source::EnvKeySource).
pub const KEY_ENV_VAR: &str = "CRYPTION_KEY";

/// Prefix of the environment variables read by
/// [`DispatcherConfig::from_env`](crate::config::DispatcherConfig::from_env).
pub const CONFIG_ENV_PREFIX: &str = "CRYPTION_";

/// Hidden CLI subcommand that runs a process-pool worker.
pub const WORKER_SUBCOMMAND: &str = "worker";

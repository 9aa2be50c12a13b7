// src/lib.rs

pub mod aliases;
#[cfg(feature = "batch-ops")]
pub mod batch_ops;
pub mod builders;
pub mod config;
pub mod consts;
pub mod crypto;
pub mod decryptor;
pub mod dispatcher;
pub mod encryptor;
pub mod engine;
pub mod error;
pub mod key_source;
pub mod queue;
pub mod task;
pub mod utils;

// Cipher and single-file engine
pub use decryptor::decrypt;
pub use encryptor::encrypt;
pub use engine::execute_task;
pub use error::{CryptionError, ErrorKind};

// Work units and queues
pub use queue::{LocalQueue, TaskQueue};
#[cfg(unix)]
pub use queue::SharedQueue;
pub use task::{Action, TaskDescriptor};

// Dispatching
pub use builders::DispatcherBuilder;
pub use config::{DispatcherConfig, SpawnMode};
pub use dispatcher::{run_worker, BatchReport, TaskFailure, TaskOutcome, WorkerDispatcher};
pub use key_source::{EnvFileKeySource, EnvKeySource, KeySource, ReaderKeySource, StaticKeySource};

#[cfg(feature = "batch-ops")]
pub use batch_ops::{decrypt_paths, encrypt_paths};

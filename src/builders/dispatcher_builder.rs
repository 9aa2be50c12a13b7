//! src/builders/dispatcher_builder.rs
//! Dispatcher builder: validates settings, reads the key once, then wires a
//! queue and a spawner together.

use crate::config::{DispatcherConfig, SpawnMode};
use crate::consts::WORKER_SUBCOMMAND;
use crate::crypto::load_cipher_key;
use crate::dispatcher::{
    DeferredSpawner, InlineSpawner, ProcessSpawner, ThreadPoolSpawner, WorkerDispatcher,
    WorkerSpawner,
};
use crate::error::CryptionError;
use crate::key_source::KeySource;
use crate::queue::local::LocalQueue;
use crate::queue::TaskQueue;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Dispatcher builder
///
/// Defaults come from [`DispatcherConfig::default`]: 1000 slots, one worker
/// per CPU, thread-pool spawning, in-process queue.
///
/// # Thread Safety
///
/// Plain data until [`build`](Self::build); `Send + Sync`.
#[derive(Debug, Clone, Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    worker_command: Option<(PathBuf, Vec<OsString>)>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: DispatcherConfig) -> Self {
        Self {
            config,
            worker_command: None,
        }
    }

    /// Set queue capacity (slots)
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the upper bound on concurrently live workers
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers;
        self
    }

    #[must_use]
    pub fn with_spawn_mode(mut self, mode: SpawnMode) -> Self {
        self.config.spawn_mode = mode;
        self
    }

    /// Back the queue with shared memory even when workers are threads.
    #[must_use]
    pub fn shared(mut self, shared: bool) -> Self {
        self.config.shared = shared;
        self
    }

    /// Program and leading arguments for process workers; the queue name is
    /// appended as the last argument.
    ///
    /// Defaults to the current executable with the hidden `worker` subcommand.
    #[must_use]
    pub fn worker_command(
        mut self,
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        self.worker_command = Some((
            program.into(),
            args.into_iter().map(Into::into).collect(),
        ));
        self
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Validate, read the key, create the queue and the spawner.
    ///
    /// Configuration and key errors surface here, before anything is queued
    /// or any file is touched.
    pub fn build(self, key_source: &dyn KeySource) -> Result<WorkerDispatcher, CryptionError> {
        self.config.validate()?;
        let key = load_cipher_key(key_source)?;

        let queue = self.make_queue()?;
        let spawner = self.make_spawner()?;

        info!(
            capacity = self.config.capacity,
            max_workers = self.config.max_workers,
            mode = %self.config.spawn_mode,
            queue = queue.shared_name().unwrap_or("local"),
            "dispatcher ready"
        );
        Ok(WorkerDispatcher::with_parts(queue, spawner, key))
    }

    fn make_queue(&self) -> Result<Arc<dyn TaskQueue>, CryptionError> {
        if self.config.needs_shared_queue() {
            return shared_queue(self.config.capacity);
        }
        Ok(Arc::new(LocalQueue::new(self.config.capacity)?))
    }

    fn make_spawner(&self) -> Result<Box<dyn WorkerSpawner>, CryptionError> {
        let max = self.config.max_workers;
        Ok(match self.config.spawn_mode {
            SpawnMode::Inline => Box::new(InlineSpawner::new()),
            SpawnMode::Threads => Box::new(ThreadPoolSpawner::new(max)?),
            SpawnMode::Deferred => Box::new(DeferredSpawner),
            SpawnMode::Processes => {
                let (program, args) = match &self.worker_command {
                    Some((program, args)) => (program.clone(), args.clone()),
                    None => {
                        let exe = std::env::current_exe().map_err(|e| {
                            CryptionError::Config(format!("cannot locate worker executable: {e}"))
                        })?;
                        (exe, vec![OsString::from(WORKER_SUBCOMMAND)])
                    }
                };
                Box::new(ProcessSpawner::new(program, args, max))
            }
        })
    }
}

#[cfg(unix)]
fn shared_queue(capacity: usize) -> Result<Arc<dyn TaskQueue>, CryptionError> {
    use crate::queue::shared::SharedQueue;
    Ok(Arc::new(SharedQueue::create_unique(capacity)?))
}

#[cfg(not(unix))]
fn shared_queue(_capacity: usize) -> Result<Arc<dyn TaskQueue>, CryptionError> {
    Err(CryptionError::Config(
        "shared queues need a unix platform".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_source::StaticKeySource;

    fn key() -> StaticKeySource {
        StaticKeySource::new(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    #[test]
    fn short_key_rejected_at_build() {
        let err = DispatcherBuilder::new()
            .build(&StaticKeySource::new(vec![0u8; 16]))
            .err()
            .unwrap();
        assert!(matches!(err, CryptionError::Config(_)));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = DispatcherBuilder::new()
            .with_max_workers(0)
            .build(&key())
            .err()
            .unwrap();
        assert!(matches!(err, CryptionError::Config(_)));
    }

    #[test]
    fn builds_local_queue_by_default() {
        let d = DispatcherBuilder::new()
            .with_capacity(3)
            .with_spawn_mode(SpawnMode::Inline)
            .build(&key())
            .unwrap();
        assert_eq!(d.queue().capacity(), 3);
        assert!(d.queue().shared_name().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn shared_flag_builds_shared_queue() {
        let d = DispatcherBuilder::new()
            .with_capacity(2)
            .with_spawn_mode(SpawnMode::Deferred)
            .shared(true)
            .build(&key())
            .unwrap();
        assert!(d.queue().shared_name().is_some());
    }
}

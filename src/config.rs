//! # Dispatcher configuration
//!
//! Plain data describing how a [`WorkerDispatcher`](crate::dispatcher::WorkerDispatcher)
//! is assembled. Built in code with
//! [`DispatcherBuilder`](crate::builders::DispatcherBuilder) or loaded from
//! `CRYPTION_*` environment variables with [`DispatcherConfig::from_env`].

use crate::consts::{CONFIG_ENV_PREFIX, DEFAULT_QUEUE_CAPACITY};
use crate::error::CryptionError;
use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How queued tasks get drained after each submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnMode {
    /// Drain on the submitting thread, right away.
    Inline,
    /// Drain loops on a bounded pool of threads.
    Threads,
    /// Drain loops in separate OS processes attached to a shared queue.
    Processes,
    /// Never spawn; tasks wait for an explicit drain.
    Deferred,
}

impl fmt::Display for SpawnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpawnMode::Inline => "inline",
            SpawnMode::Threads => "threads",
            SpawnMode::Processes => "processes",
            SpawnMode::Deferred => "deferred",
        };
        f.write_str(name)
    }
}

impl FromStr for SpawnMode {
    type Err = CryptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inline" => Ok(SpawnMode::Inline),
            "threads" => Ok(SpawnMode::Threads),
            "processes" => Ok(SpawnMode::Processes),
            "deferred" => Ok(SpawnMode::Deferred),
            _ => Err(CryptionError::Config(format!(
                "invalid spawn mode '{s}': expected inline, threads, processes or deferred"
            ))),
        }
    }
}

/// Queue and worker settings for one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of queue slots.
    pub capacity: usize,
    /// Upper bound on concurrently live workers.
    pub max_workers: usize,
    pub spawn_mode: SpawnMode,
    /// Back the queue with shared memory. Implied by [`SpawnMode::Processes`].
    pub shared: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            max_workers: num_cpus::get().max(1),
            spawn_mode: SpawnMode::Threads,
            shared: false,
        }
    }
}

impl DispatcherConfig {
    /// Defaults overridden by `CRYPTION_CAPACITY`, `CRYPTION_MAX_WORKERS`,
    /// `CRYPTION_SPAWN_MODE` and `CRYPTION_SHARED`.
    pub fn from_env() -> Result<Self, CryptionError> {
        Self::figment().extract().map_err(|e| {
            CryptionError::Config(format!("invalid dispatcher configuration: {e}"))
        })
    }

    /// The layered configuration source, for callers that want to merge more
    /// providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(CONFIG_ENV_PREFIX).ignore(&["KEY"]))
    }

    /// `true` when the queue has to live in shared memory.
    #[must_use]
    pub fn needs_shared_queue(&self) -> bool {
        self.shared || self.spawn_mode == SpawnMode::Processes
    }

    pub fn validate(&self) -> Result<(), CryptionError> {
        if self.capacity == 0 {
            return Err(CryptionError::Config(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(CryptionError::Config(
                "max_workers must be at least 1".into(),
            ));
        }
        if self.needs_shared_queue() && !cfg!(unix) {
            return Err(CryptionError::Config(
                "shared queues need a unix platform; use inline or threads".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[test]
    fn defaults_are_valid() {
        let config = DispatcherConfig::default();
        assert_eq!(config.capacity, 1000);
        assert!(config.max_workers >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn zero_capacity_invalid() {
        let config = DispatcherConfig {
            capacity: 0,
            ..DispatcherConfig::default()
        };
        assert!(matches!(config.validate(), Err(CryptionError::Config(_))));
    }

    #[test]
    fn processes_imply_shared_queue() {
        let config = DispatcherConfig {
            spawn_mode: SpawnMode::Processes,
            ..DispatcherConfig::default()
        };
        assert!(config.needs_shared_queue());
    }

    #[test]
    fn layered_override() {
        let config: DispatcherConfig = DispatcherConfig::figment()
            .merge(Serialized::default("spawn_mode", "inline"))
            .merge(Serialized::default("capacity", 8))
            .extract()
            .unwrap();
        assert_eq!(config.spawn_mode, SpawnMode::Inline);
        assert_eq!(config.capacity, 8);
    }

    #[test]
    fn spawn_mode_parsing() {
        assert_eq!("Threads".parse::<SpawnMode>().unwrap(), SpawnMode::Threads);
        assert!("fork".parse::<SpawnMode>().is_err());
    }
}

#[cfg(feature = "batch-ops")]
use std::path::Path;

#[cfg(feature = "batch-ops")]
use crate::config::DispatcherConfig;
#[cfg(feature = "batch-ops")]
use crate::dispatcher::{BatchReport, WorkerDispatcher};
#[cfg(feature = "batch-ops")]
use crate::key_source::KeySource;
#[cfg(feature = "batch-ops")]
use crate::task::Action;
#[cfg(feature = "batch-ops")]
use crate::CryptionError;

/// Encrypt every path in place as one batch.
///
/// Only a configuration or key error fails the call; per-file failures are in
/// the returned report.
#[cfg(feature = "batch-ops")]
pub fn encrypt_paths<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
    key_source: &dyn KeySource,
    config: DispatcherConfig,
) -> Result<BatchReport, CryptionError> {
    run_batch(Action::Encrypt, paths, key_source, config)
}

/// Decrypt every path in place as one batch.
#[cfg(feature = "batch-ops")]
pub fn decrypt_paths<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
    key_source: &dyn KeySource,
    config: DispatcherConfig,
) -> Result<BatchReport, CryptionError> {
    run_batch(Action::Decrypt, paths, key_source, config)
}

#[cfg(feature = "batch-ops")]
fn run_batch<P: AsRef<Path>>(
    action: Action,
    paths: impl IntoIterator<Item = P>,
    key_source: &dyn KeySource,
    config: DispatcherConfig,
) -> Result<BatchReport, CryptionError> {
    let dispatcher = WorkerDispatcher::new(config, key_source)?;
    dispatcher.submit_all(action, paths)?;
    Ok(dispatcher.finish())
}

//! Entry point for a worker process started by a process spawner.

use crate::error::CryptionError;
use crate::key_source::KeySource;
use std::io::Write;

/// Attach to the shared queue `queue_name`, drain it, and write one JSON
/// [`TaskOutcome`](crate::dispatcher::TaskOutcome) per line to `out`.
///
/// Returns the number of tasks handled. Per-task failures go to `out`, not to
/// the return value; an error here means the worker could not run at all.
#[cfg(unix)]
pub fn run_worker(
    queue_name: &str,
    key_source: &dyn KeySource,
    mut out: impl Write,
) -> Result<usize, CryptionError> {
    use crate::crypto::load_cipher_key;
    use crate::dispatcher::drain::DrainLoop;
    use crate::queue::shared::SharedQueue;
    use crate::queue::TaskQueue;
    use std::sync::Arc;
    use tracing::{info, warn};

    let key = Arc::new(load_cipher_key(key_source)?);
    let queue: Arc<dyn TaskQueue> = Arc::new(SharedQueue::open(queue_name)?);

    let mut write_error = None;
    let handled = DrainLoop::new(queue, key).run_with(|outcome| {
        if write_error.is_some() {
            return;
        }
        let written = serde_json::to_writer(&mut out, &outcome)
            .map_err(std::io::Error::from)
            .and_then(|()| out.write_all(b"\n"))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            warn!(error = %e, "cannot report outcome to parent");
            write_error = Some(e);
        }
    });

    info!(queue = queue_name, handled, pid = std::process::id(), "worker done");
    match write_error {
        Some(e) => Err(e.into()),
        None => Ok(handled),
    }
}

#[cfg(not(unix))]
pub fn run_worker(
    queue_name: &str,
    _key_source: &dyn KeySource,
    _out: impl Write,
) -> Result<usize, CryptionError> {
    Err(CryptionError::Config(format!(
        "cannot attach to shared queue '{queue_name}': process workers need a unix platform"
    )))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::dispatcher::report::TaskOutcome;
    use crate::key_source::StaticKeySource;
    use crate::queue::shared::SharedQueue;
    use crate::queue::TaskQueue;
    use crate::task::{Action, TaskDescriptor};
    use std::fs;

    #[test]
    fn drains_shared_queue_and_reports_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello world").unwrap();

        let queue = SharedQueue::create_unique(4).unwrap();
        queue
            .enqueue(&TaskDescriptor::new(Action::Encrypt, &file).unwrap())
            .unwrap();
        queue
            .enqueue(&TaskDescriptor::new(Action::Encrypt, dir.path().join("gone")).unwrap())
            .unwrap();

        let key = StaticKeySource::new(vec![3u8; 32]);
        let mut out = Vec::new();
        let handled = run_worker(queue.name(), &key, &mut out).unwrap();
        assert_eq!(handled, 2);
        assert!(queue.is_empty());

        let lines: Vec<TaskOutcome> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_success());
        assert!(!lines[1].is_success());
        assert_eq!(fs::read(&file).unwrap().len(), 32);
    }

    #[test]
    fn short_key_fails_before_attaching() {
        let key = StaticKeySource::new(vec![3u8; 16]);
        let err = run_worker("cq-never-created", &key, Vec::new()).unwrap_err();
        assert!(matches!(err, CryptionError::Config(_)));
    }
}

//! The worker drain loop.

use crate::aliases::Aes256Key32;
use crate::dispatcher::report::{TaskFailure, TaskOutcome};
use crate::engine::execute_task;
use crate::error::CryptionError;
use crate::queue::TaskQueue;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// One worker's loop: pull with `try_drain_once` until empty, executing each
/// task and recording its outcome.
///
/// Exhaustion is only ever tested with the non-blocking call, so a loop that
/// races another worker for the last task returns instead of hanging.
#[derive(Clone)]
pub struct DrainLoop {
    queue: Arc<dyn TaskQueue>,
    key: Arc<Aes256Key32>,
}

impl DrainLoop {
    #[must_use]
    pub fn new(queue: Arc<dyn TaskQueue>, key: Arc<Aes256Key32>) -> Self {
        Self { queue, key }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    #[must_use]
    pub fn key(&self) -> &Arc<Aes256Key32> {
        &self.key
    }

    /// Drain until empty and return every outcome.
    pub fn run(&self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        self.run_with(|outcome| outcomes.push(outcome));
        outcomes
    }

    /// Drain until empty, handing each outcome to `sink` as it happens.
    /// Returns the number of outcomes produced.
    pub fn run_with(&self, mut sink: impl FnMut(TaskOutcome)) -> usize {
        let mut handled = 0usize;
        while let Some(outcome) = self.step() {
            sink(outcome);
            handled += 1;
        }
        debug!(handled, "drain loop finished");
        handled
    }

    /// Take and execute at most one task.
    ///
    /// `None` once the queue reports empty, or when the queue itself fails.
    pub fn step(&self) -> Option<TaskOutcome> {
        let task = match self.queue.try_drain_once() {
            Ok(Some(task)) => task,
            Ok(None) => return None,
            Err(err @ CryptionError::Format(_)) => {
                // The slot was consumed; only this record is lost.
                warn!(error = %err, "discarding malformed queue record");
                return Some(TaskOutcome::Failed(TaskFailure::new(None, &err)));
            }
            Err(err) => {
                error!(error = %err, "queue failure; stopping drain loop");
                return None;
            }
        };

        let result = execute_task(&task, &self.key);
        if let Err(err) = &result {
            warn!(path = task.path_str(), action = %task.action(), error = %err, "task failed");
        }
        Some(TaskOutcome::from_result(&task, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::local::LocalQueue;
    use crate::task::{Action, TaskDescriptor};
    use std::fs;

    fn key() -> Arc<Aes256Key32> {
        Arc::new(Aes256Key32::new([42u8; 32]))
    }

    #[test]
    fn empty_queue_returns_immediately() {
        let queue: Arc<dyn TaskQueue> = Arc::new(LocalQueue::new(2).unwrap());
        assert!(DrainLoop::new(queue, key()).run().is_empty());
    }

    #[test]
    fn failures_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, b"data").unwrap();
        let missing = dir.path().join("missing.txt");

        let queue: Arc<dyn TaskQueue> = Arc::new(LocalQueue::new(4).unwrap());
        queue
            .enqueue(&TaskDescriptor::new(Action::Encrypt, &missing).unwrap())
            .unwrap();
        queue
            .enqueue(&TaskDescriptor::new(Action::Encrypt, &good).unwrap())
            .unwrap();

        let outcomes = DrainLoop::new(Arc::clone(&queue), key()).run();
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
        assert!(queue.is_empty());
        assert_eq!(fs::read(&good).unwrap().len(), 32);
    }
}

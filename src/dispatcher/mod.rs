//! # Worker dispatcher
//!
//! Accepts submissions, enqueues them and lets a [`WorkerSpawner`] arrange
//! for workers to drain the queue. Outcomes from every worker, plus any inline
//! draining, are folded into one [`BatchReport`] by [`WorkerDispatcher::finish`].
//!
//! ```text
//! submit(task) ──► queue.enqueue ──► spawner.spawn(DrainLoop)
//!                                          │
//!                    ┌─────────────────────┼─────────────────────┐
//!                 inline              thread pool           process pool
//!                    └──► try_drain_once ► execute_task ► TaskOutcome
//! ```

pub mod drain;
pub mod report;
pub mod spawner;
pub mod worker;

pub use drain::DrainLoop;
pub use report::{BatchReport, TaskFailure, TaskOutcome};
pub use spawner::{
    DeferredSpawner, InlineSpawner, ProcessSpawner, SpawnStatus, ThreadPoolSpawner, WorkerSpawner,
};
pub use worker::run_worker;

use crate::aliases::Aes256Key32;
use crate::builders::DispatcherBuilder;
use crate::config::DispatcherConfig;
use crate::error::CryptionError;
use crate::key_source::KeySource;
use crate::queue::TaskQueue;
use crate::task::{Action, TaskDescriptor};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct WorkerDispatcher {
    // Declared first so it drops first: worker processes are reaped before the
    // queue they are attached to is torn down.
    spawner: Box<dyn WorkerSpawner>,
    queue: Arc<dyn TaskQueue>,
    key: Arc<Aes256Key32>,
    collected: Mutex<Vec<TaskOutcome>>,
}

impl WorkerDispatcher {
    /// Build a dispatcher from `config`, reading `key_source` once.
    ///
    /// # Errors
    ///
    /// [`CryptionError::Config`] for an invalid configuration or a key shorter
    /// than 32 bytes; nothing has been queued or touched at that point.
    pub fn new(config: DispatcherConfig, key_source: &dyn KeySource) -> Result<Self, CryptionError> {
        DispatcherBuilder::from_config(config).build(key_source)
    }

    /// Assemble a dispatcher from already-built parts.
    #[must_use]
    pub fn with_parts(
        queue: Arc<dyn TaskQueue>,
        spawner: Box<dyn WorkerSpawner>,
        key: Aes256Key32,
    ) -> Self {
        Self {
            spawner,
            queue,
            key: Arc::new(key),
            collected: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    fn worker(&self) -> DrainLoop {
        DrainLoop::new(Arc::clone(&self.queue), Arc::clone(&self.key))
    }

    /// Queue `task`, then ask the spawner to start a worker.
    ///
    /// Enqueueing may block while the queue is full and workers are busy. A
    /// spawn failure is logged and the task stays queued for the final drain;
    /// the only error returned is a failure to enqueue.
    pub fn submit(&self, task: &TaskDescriptor) -> Result<SpawnStatus, CryptionError> {
        self.make_room();
        self.queue.enqueue(task)?;

        match self.spawner.spawn(self.worker()) {
            Ok(status) => Ok(status),
            Err(err) => {
                warn!(path = task.path_str(), error = %err, "cannot start worker; task left for drain");
                Ok(SpawnStatus::Deferred)
            }
        }
    }

    /// Submit one `action` task per path and return how many were queued.
    ///
    /// A path that cannot be described (empty, non UTF-8, too long) is
    /// recorded as a failed task instead of aborting the batch.
    pub fn submit_all<P: AsRef<Path>>(
        &self,
        action: Action,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<usize, CryptionError> {
        let mut queued = 0usize;
        for path in paths {
            let path = path.as_ref();
            match TaskDescriptor::new(action, path) {
                Ok(task) => {
                    self.submit(&task)?;
                    queued += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unrepresentable path");
                    self.collected.lock().push(TaskOutcome::Failed(TaskFailure::new(
                        Some(path.to_string_lossy().into_owned()),
                        &err,
                    )));
                }
            }
        }
        Ok(queued)
    }

    /// Drain the queue on the calling thread until it reports empty.
    ///
    /// Safe to call while other workers are draining the same queue. Returns
    /// the number of tasks this call handled.
    pub fn drain_all(&self) -> usize {
        let outcomes = self.worker().run();
        let handled = outcomes.len();
        self.collected.lock().extend(outcomes);
        handled
    }

    /// Wait for every worker, drain whatever is left, and summarize the batch.
    pub fn finish(self) -> BatchReport {
        let mut report = BatchReport::from_outcomes(self.spawner.join());
        self.drain_all();
        report.extend(std::mem::take(&mut *self.collected.lock()));

        info!(
            succeeded = report.succeeded,
            failed = report.failed_count(),
            "batch complete"
        );
        report
    }

    /// With a full queue and nobody draining it, a blocking enqueue would
    /// never return. Run tasks here until a slot is free.
    fn make_room(&self) {
        if self.queue.len() < self.queue.capacity() {
            return;
        }
        let worker = self.worker();
        while self.queue.len() >= self.queue.capacity() {
            match worker.step() {
                Some(outcome) => self.collected.lock().push(outcome),
                None => break,
            }
        }
    }
}

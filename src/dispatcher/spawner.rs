//! Worker-spawning strategies.
//!
//! A [`WorkerSpawner`] is handed a ready-to-run [`DrainLoop`] after every
//! submission and decides where (or whether) it runs. Outcomes produced by
//! spawned workers are collected by [`WorkerSpawner::join`].

use crate::dispatcher::drain::DrainLoop;
use crate::dispatcher::report::TaskOutcome;
use crate::error::CryptionError;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// What a spawn request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnStatus {
    /// A worker was started (or, inline, already ran).
    Started,
    /// `max_workers` are already live; the task waits for one of them or for
    /// the final drain.
    Saturated,
    /// This spawner never starts workers.
    Deferred,
}

pub trait WorkerSpawner: Send + Sync {
    /// Arrange for `worker` to run.
    ///
    /// # Errors
    ///
    /// [`CryptionError::Spawn`] when a worker could not be created. The task is
    /// still queued; the caller decides how to degrade.
    fn spawn(&self, worker: DrainLoop) -> Result<SpawnStatus, CryptionError>;

    /// Wait for every worker started so far and return their outcomes.
    fn join(&self) -> Vec<TaskOutcome>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Inline
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the drain loop on the caller's thread, immediately.
#[derive(Default)]
pub struct InlineSpawner {
    outcomes: Mutex<Vec<TaskOutcome>>,
}

impl InlineSpawner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerSpawner for InlineSpawner {
    fn spawn(&self, worker: DrainLoop) -> Result<SpawnStatus, CryptionError> {
        let outcomes = worker.run();
        self.outcomes.lock().extend(outcomes);
        Ok(SpawnStatus::Started)
    }

    fn join(&self) -> Vec<TaskOutcome> {
        std::mem::take(&mut *self.outcomes.lock())
    }
}

/// Never starts anything. Queued tasks wait for an explicit `drain_all`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredSpawner;

impl WorkerSpawner for DeferredSpawner {
    fn spawn(&self, _worker: DrainLoop) -> Result<SpawnStatus, CryptionError> {
        Ok(SpawnStatus::Deferred)
    }

    fn join(&self) -> Vec<TaskOutcome> {
        Vec::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Thread pool
// ─────────────────────────────────────────────────────────────────────────────

/// Runs drain loops on a dedicated rayon pool, at most `max_workers` at once.
pub struct ThreadPoolSpawner {
    pool: rayon::ThreadPool,
    max_workers: usize,
    active: Arc<AtomicUsize>,
    pending: AtomicUsize,
    tx: Sender<Vec<TaskOutcome>>,
    rx: Receiver<Vec<TaskOutcome>>,
}

impl ThreadPoolSpawner {
    pub fn new(max_workers: usize) -> Result<Self, CryptionError> {
        if max_workers == 0 {
            return Err(CryptionError::Config(
                "max_workers must be at least 1".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("cryption-worker-{i}"))
            .build()
            .map_err(|e| CryptionError::Spawn(format!("cannot build worker pool: {e}")))?;
        let (tx, rx) = channel::unbounded();
        Ok(Self {
            pool,
            max_workers,
            active: Arc::new(AtomicUsize::new(0)),
            pending: AtomicUsize::new(0),
            tx,
            rx,
        })
    }

    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl WorkerSpawner for ThreadPoolSpawner {
    fn spawn(&self, worker: DrainLoop) -> Result<SpawnStatus, CryptionError> {
        let max = self.max_workers;
        if self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_err()
        {
            return Ok(SpawnStatus::Saturated);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        let active = Arc::clone(&self.active);
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let outcomes = panic::catch_unwind(AssertUnwindSafe(|| worker.run()))
                .unwrap_or_else(|_| {
                    error!("drain worker panicked");
                    Vec::new()
                });
            active.fetch_sub(1, Ordering::AcqRel);
            // The receiver lives as long as the spawner; a send can only fail
            // during teardown, when nobody wants the outcomes anyway.
            let _ = tx.send(outcomes);
        });
        Ok(SpawnStatus::Started)
    }

    fn join(&self) -> Vec<TaskOutcome> {
        let expected = self.pending.swap(0, Ordering::AcqRel);
        self.rx.iter().take(expected).flatten().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process pool
// ─────────────────────────────────────────────────────────────────────────────

struct ChildWorker {
    child: Child,
    reader: JoinHandle<Vec<TaskOutcome>>,
}

/// Runs each drain loop in a child process attached to the shared queue.
///
/// The child is started as `program args... <queue-name>`, receives the
/// 32-byte key on stdin (then EOF), and writes one JSON [`TaskOutcome`] per
/// line on stdout. A reader thread per child consumes that stream so a child
/// never blocks on a full pipe.
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    max_workers: usize,
    children: Mutex<Vec<ChildWorker>>,
}

impl ProcessSpawner {
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
        max_workers: usize,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            max_workers: max_workers.max(1),
            children: Mutex::new(Vec::new()),
        }
    }

    fn start(&self, queue_name: &str, worker: &DrainLoop) -> Result<ChildWorker, CryptionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(queue_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                CryptionError::Spawn(format!(
                    "cannot start worker {}: {e}",
                    self.program.display()
                ))
            })?;

        let handed_key = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("worker stdin not captured"))
            .and_then(|mut stdin| stdin.write_all(worker.key().expose_secret()));
        let stdout = child.stdout.take();

        let reader = match (handed_key, stdout) {
            (Ok(()), Some(stdout)) => thread::Builder::new()
                .name("cryption-worker-reader".into())
                .spawn(move || read_outcomes(stdout))
                .map_err(|e| CryptionError::Spawn(format!("cannot start reader thread: {e}"))),
            (Err(e), _) => Err(CryptionError::Spawn(format!("cannot hand key to worker: {e}"))),
            (Ok(()), None) => Err(CryptionError::Spawn("worker stdout not captured".into())),
        };

        match reader {
            Ok(reader) => {
                debug!(pid = child.id(), queue = queue_name, "started worker process");
                Ok(ChildWorker { child, reader })
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(err)
            }
        }
    }
}

fn read_outcomes(stream: impl Read) -> Vec<TaskOutcome> {
    let mut outcomes = Vec::new();
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "worker output stream failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TaskOutcome>(&line) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(error = %e, "ignoring unparseable worker output line"),
        }
    }
    outcomes
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self, worker: DrainLoop) -> Result<SpawnStatus, CryptionError> {
        let queue_name = worker.queue().shared_name().ok_or_else(|| {
            CryptionError::Spawn("process workers need a shared-memory queue".into())
        })?;

        let mut children = self.children.lock();
        let live = children
            .iter_mut()
            .map(|w| w.child.try_wait())
            .filter(|status| matches!(status, Ok(None)))
            .count();
        if live >= self.max_workers {
            return Ok(SpawnStatus::Saturated);
        }

        let started = self.start(queue_name, &worker)?;
        children.push(started);
        Ok(SpawnStatus::Started)
    }

    fn join(&self) -> Vec<TaskOutcome> {
        let children = std::mem::take(&mut *self.children.lock());
        let mut outcomes = Vec::new();
        for ChildWorker { mut child, reader } in children {
            let pid = child.id();
            match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => warn!(pid, %status, "worker process exited abnormally"),
                Err(e) => warn!(pid, error = %e, "cannot wait for worker process"),
            }
            match reader.join() {
                Ok(mut produced) => outcomes.append(&mut produced),
                Err(_) => error!(pid, "worker reader thread panicked"),
            }
        }
        outcomes
    }
}

impl Drop for ProcessSpawner {
    fn drop(&mut self) {
        // No orphans: the shared queue is unlinked right after this.
        let _ = self.join();
    }
}

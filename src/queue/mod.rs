// src/queue/mod.rs

//! Bounded FIFO task queues.
//!
//! Both implementations hold *serialized* descriptors in a fixed ring of
//! `capacity` slots with `head`, `tail` and `count`, where
//! `tail == (head + count) % capacity` and `0 <= count <= capacity`. Every
//! index update happens inside one exclusive-access region per queue, which
//! totally orders producers and consumers and gives FIFO delivery.
//!
//! - [`LocalQueue`]: in-process, mutex + two condition variables.
//! - [`SharedQueue`] (unix): a POSIX shared-memory ring guarded by named
//!   semaphores, attachable from other processes by name.
//!
//! Dispatchers and workers depend only on the [`TaskQueue`] trait.

pub mod local;
#[cfg(unix)]
pub mod shared;

pub use local::LocalQueue;
#[cfg(unix)]
pub use shared::SharedQueue;

use crate::error::CryptionError;
use crate::task::TaskDescriptor;

/// A bounded, blocking, multi-producer multi-consumer FIFO of task descriptors.
pub trait TaskQueue: Send + Sync {
    /// Append `task`, blocking while the queue is full.
    ///
    /// Capacity is enforced by waiting, never by dropping or rejecting the
    /// task. Errors only for descriptors that cannot be stored at all or for
    /// failures of the underlying OS primitives.
    fn enqueue(&self, task: &TaskDescriptor) -> Result<(), CryptionError>;

    /// Remove the oldest task, blocking while the queue is empty.
    fn dequeue(&self) -> Result<TaskDescriptor, CryptionError>;

    /// Remove the oldest task if there is one, without blocking.
    ///
    /// Drain loops use this to detect exhaustion; calling [`dequeue`](Self::dequeue)
    /// on a genuinely empty queue would wait forever.
    fn try_drain_once(&self) -> Result<Option<TaskDescriptor>, CryptionError>;

    /// Number of queued tasks at the moment of the call.
    fn len(&self) -> usize;

    /// Fixed number of slots.
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name other processes can attach to, for cross-process queues.
    fn shared_name(&self) -> Option<&str> {
        None
    }
}

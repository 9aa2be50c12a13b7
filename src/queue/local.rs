//! In-process bounded ring buffer.

use crate::error::CryptionError;
use crate::queue::TaskQueue;
use crate::task::TaskDescriptor;
use parking_lot::{Condvar, Mutex};

struct Ring {
    slots: Vec<Vec<u8>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl Ring {
    fn push(&mut self, record: Vec<u8>) {
        let capacity = self.slots.len();
        self.slots[self.tail] = record;
        self.tail = (self.tail + 1) % capacity;
        self.count += 1;
    }

    fn pop(&mut self) -> Vec<u8> {
        let capacity = self.slots.len();
        let record = std::mem::take(&mut self.slots[self.head]);
        self.head = (self.head + 1) % capacity;
        self.count -= 1;
        record
    }
}

/// Lock-protected ring of serialized descriptors for use within one process.
///
/// `enqueue` waits on `not_full`, `dequeue` waits on `not_empty`; each side
/// signals the other after releasing the lock.
pub struct LocalQueue {
    ring: Mutex<Ring>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl LocalQueue {
    /// Create an empty queue with `capacity` slots.
    ///
    /// # Errors
    ///
    /// [`CryptionError::Config`] for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self, CryptionError> {
        if capacity == 0 {
            return Err(CryptionError::Config(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            ring: Mutex::new(Ring {
                slots: vec![Vec::new(); capacity],
                head: 0,
                tail: 0,
                count: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    fn take_locked(&self, mut ring: parking_lot::MutexGuard<'_, Ring>) -> Vec<u8> {
        let record = ring.pop();
        drop(ring);
        self.not_full.notify_one();
        record
    }
}

impl TaskQueue for LocalQueue {
    fn enqueue(&self, task: &TaskDescriptor) -> Result<(), CryptionError> {
        let record = task.encode();

        let mut ring = self.ring.lock();
        while ring.count == ring.slots.len() {
            self.not_full.wait(&mut ring);
        }
        ring.push(record);
        drop(ring);

        self.not_empty.notify_one();
        Ok(())
    }

    fn dequeue(&self) -> Result<TaskDescriptor, CryptionError> {
        let mut ring = self.ring.lock();
        while ring.count == 0 {
            self.not_empty.wait(&mut ring);
        }
        let record = self.take_locked(ring);
        TaskDescriptor::decode(&record)
    }

    fn try_drain_once(&self) -> Result<Option<TaskDescriptor>, CryptionError> {
        let ring = self.ring.lock();
        if ring.count == 0 {
            return Ok(None);
        }
        let record = self.take_locked(ring);
        TaskDescriptor::decode(&record).map(Some)
    }

    fn len(&self) -> usize {
        self.ring.lock().count
    }

    fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Action;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn task(name: &str) -> TaskDescriptor {
        TaskDescriptor::new(Action::Encrypt, name).unwrap()
    }

    #[test]
    fn fifo_order() {
        let q = LocalQueue::new(4).unwrap();
        q.enqueue(&task("a")).unwrap();
        q.enqueue(&task("b")).unwrap();
        assert_eq!(q.dequeue().unwrap(), task("a"));
        assert_eq!(q.dequeue().unwrap(), task("b"));
    }

    #[test]
    fn wraps_around_capacity() {
        let q = LocalQueue::new(2).unwrap();
        for round in 0..5 {
            let name = format!("f{round}");
            q.enqueue(&task(&name)).unwrap();
            assert_eq!(q.len(), 1);
            assert_eq!(q.try_drain_once().unwrap(), Some(task(&name)));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn try_drain_on_empty_returns_none() {
        let q = LocalQueue::new(1).unwrap();
        assert_eq!(q.try_drain_once().unwrap(), None);
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(LocalQueue::new(0), Err(CryptionError::Config(_))));
    }

    #[test]
    fn dequeue_blocks_until_enqueue() {
        let q = Arc::new(LocalQueue::new(1).unwrap());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue().unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        q.enqueue(&task("late")).unwrap();
        assert_eq!(consumer.join().unwrap(), task("late"));
    }
}

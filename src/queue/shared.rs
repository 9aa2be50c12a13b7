//! Cross-process bounded ring buffer.
//!
//! Layout of the shared-memory segment `/<name>`:
//!
//! ```text
//! +--------------------------+------------------------------------------+
//! | Header (6 x u32 atomics) | capacity x slot (u32 LE len + record)    |
//! +--------------------------+------------------------------------------+
//! ```
//!
//! Three named semaphores coordinate every attached process:
//!
//! - `/<name>.items`: number of filled slots (consumers wait on it)
//! - `/<name>.slots`: number of free slots (producers wait on it)
//! - `/<name>.lock`:  binary semaphore guarding `head`/`tail`/`count` and slot bytes
//!
//! The process that [`create`](SharedQueue::create)s the queue owns the names
//! and unlinks them on drop; [`open`](SharedQueue::open)ed handles only unmap.
//!
//! Residual risk: a process killed after taking `.slots`/`.items` but before
//! posting the matching semaphore leaks one slot or one item. The window is
//! the few instructions of a slot copy; nothing here claims crash safety.

use crate::consts::MAX_DESCRIPTOR_LEN;
use crate::error::CryptionError;
use crate::queue::TaskQueue;
use crate::task::TaskDescriptor;
use std::ffi::CString;
use std::io;
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tracing::{debug, warn};

const MAGIC: u32 = 0x4352_5950; // "CRYP"
const SLOT_PREFIX: usize = size_of::<u32>();
const SLOT_SIZE: usize = SLOT_PREFIX + MAX_DESCRIPTOR_LEN;
const HEADER_SIZE: usize = size_of::<Header>();

#[repr(C)]
struct Header {
    magic: AtomicU32,
    capacity: AtomicU32,
    slot_size: AtomicU32,
    head: AtomicU32,
    tail: AtomicU32,
    count: AtomicU32,
}

/// Build a queue name that is unique to this process and call.
///
/// Short enough for platforms with 31-byte semaphore names.
#[must_use]
pub fn unique_name() -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let salt = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("cq-{}-{n}-{salt:x}", std::process::id())
}

fn validate_name(name: &str) -> Result<(), CryptionError> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(CryptionError::Config(format!(
            "invalid shared queue name '{name}'"
        )));
    }
    Ok(())
}

fn os_name(name: &str, suffix: &str) -> Result<CString, CryptionError> {
    CString::new(format!("/{name}{suffix}"))
        .map_err(|_| CryptionError::Config(format!("invalid shared queue name '{name}'")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Named semaphore
// ─────────────────────────────────────────────────────────────────────────────

struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: CString,
}

impl NamedSemaphore {
    fn create(name: CString, initial: u32) -> io::Result<Self> {
        // SAFETY: `name` is a valid NUL-terminated string; the variadic
        // arguments are the mode and initial value that O_CREAT requires.
        let sem = unsafe {
            libc::sem_open(
                name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { sem, name })
    }

    fn open(name: CString) -> io::Result<Self> {
        // SAFETY: `name` is a valid NUL-terminated string; no O_CREAT, so no
        // variadic arguments are read.
        let sem = unsafe { libc::sem_open(name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { sem, name })
    }

    fn wait(&self) -> io::Result<()> {
        loop {
            // SAFETY: `self.sem` came from a successful sem_open and stays
            // open until drop.
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// `Ok(false)` when the count is zero.
    fn try_wait(&self) -> io::Result<bool> {
        loop {
            // SAFETY: see `wait`.
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }

    fn post(&self) -> io::Result<()> {
        // SAFETY: see `wait`.
        if unsafe { libc::sem_post(self.sem) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn unlink(&self) {
        // SAFETY: valid C string; unlinking a missing name only sets errno.
        unsafe { libc::sem_unlink(self.name.as_ptr()) };
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: closed exactly once.
        unsafe { libc::sem_close(self.sem) };
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared memory mapping
// ─────────────────────────────────────────────────────────────────────────────

struct Mapping {
    ptr: *mut u8,
    len: usize,
}

impl Mapping {
    fn map(fd: libc::c_int, len: usize) -> io::Result<Self> {
        // SAFETY: `fd` is an open shared-memory object of at least `len` bytes.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: ptr.cast(),
            len,
        })
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe a live mapping created in `map`.
        unsafe { libc::munmap(self.ptr.cast(), self.len) };
    }
}

fn close_fd(fd: libc::c_int) {
    // SAFETY: `fd` is owned by the caller and not used afterwards.
    unsafe { libc::close(fd) };
}

// ─────────────────────────────────────────────────────────────────────────────
// SharedQueue
// ─────────────────────────────────────────────────────────────────────────────

/// A [`TaskQueue`] living in POSIX shared memory, usable from any process
/// that knows its name.
pub struct SharedQueue {
    name: String,
    capacity: usize,
    owner: bool,
    map: Mapping,
    items: NamedSemaphore,
    slots: NamedSemaphore,
    lock: NamedSemaphore,
}

// SAFETY: the raw pointers refer to a MAP_SHARED region and process-wide
// semaphores. Header fields are atomics; slot bytes are only touched while
// holding `lock`, which serializes every thread of every attached process.
unsafe impl Send for SharedQueue {}
// SAFETY: see `Send`.
unsafe impl Sync for SharedQueue {}

impl SharedQueue {
    /// Create a new named queue with `capacity` slots.
    ///
    /// Fails if any of the names already exist (a stale queue from a crashed
    /// run is not reused).
    pub fn create(name: &str, capacity: usize) -> Result<Self, CryptionError> {
        validate_name(name)?;
        if capacity == 0 {
            return Err(CryptionError::Config(
                "queue capacity must be at least 1".into(),
            ));
        }
        let capacity_u32 = u32::try_from(capacity).map_err(|_| {
            CryptionError::Config(format!("queue capacity {capacity} is too large"))
        })?;
        let len = HEADER_SIZE + capacity * SLOT_SIZE;

        let shm_name = os_name(name, "")?;
        // SAFETY: valid C string; mode is passed as the third argument.
        let fd = unsafe {
            libc::shm_open(
                shm_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600 as libc::c_uint,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let unlink_shm = || {
            // SAFETY: valid C string.
            unsafe { libc::shm_unlink(shm_name.as_ptr()) };
        };

        // SAFETY: `fd` is the object just created above.
        if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            close_fd(fd);
            unlink_shm();
            return Err(err.into());
        }
        let map = Mapping::map(fd, len);
        close_fd(fd);
        let map = match map {
            Ok(map) => map,
            Err(err) => {
                unlink_shm();
                return Err(err.into());
            }
        };

        // SAFETY: the mapping is at least HEADER_SIZE bytes, page aligned,
        // and nobody else can reach it before the semaphores exist.
        unsafe {
            ptr::write(
                map.ptr.cast::<Header>(),
                Header {
                    magic: AtomicU32::new(MAGIC),
                    capacity: AtomicU32::new(capacity_u32),
                    slot_size: AtomicU32::new(SLOT_SIZE as u32),
                    head: AtomicU32::new(0),
                    tail: AtomicU32::new(0),
                    count: AtomicU32::new(0),
                },
            );
        }

        let semaphores = (|| -> Result<_, CryptionError> {
            let items = NamedSemaphore::create(os_name(name, ".items")?, 0)?;
            let slots = match NamedSemaphore::create(os_name(name, ".slots")?, capacity_u32) {
                Ok(s) => s,
                Err(e) => {
                    items.unlink();
                    return Err(e.into());
                }
            };
            let lock = match NamedSemaphore::create(os_name(name, ".lock")?, 1) {
                Ok(s) => s,
                Err(e) => {
                    items.unlink();
                    slots.unlink();
                    return Err(e.into());
                }
            };
            Ok((items, slots, lock))
        })();
        let (items, slots, lock) = match semaphores {
            Ok(sems) => sems,
            Err(err) => {
                unlink_shm();
                return Err(err);
            }
        };

        debug!(name, capacity, bytes = len, "created shared task queue");
        Ok(Self {
            name: name.to_owned(),
            capacity,
            owner: true,
            map,
            items,
            slots,
            lock,
        })
    }

    /// Attach to a queue created by another process.
    pub fn open(name: &str) -> Result<Self, CryptionError> {
        validate_name(name)?;
        let shm_name = os_name(name, "")?;
        // SAFETY: valid C string; no O_CREAT so the mode is ignored.
        let fd = unsafe { libc::shm_open(shm_name.as_ptr(), libc::O_RDWR, 0 as libc::c_uint) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        // SAFETY: zeroed `stat` is a valid out-parameter for fstat.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is open; `st` is a valid pointer.
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            let err = io::Error::last_os_error();
            close_fd(fd);
            return Err(err.into());
        }
        let len = st.st_size as usize;
        if len < HEADER_SIZE {
            close_fd(fd);
            return Err(CryptionError::Format(format!(
                "shared queue '{name}' is only {len} bytes"
            )));
        }
        let map = Mapping::map(fd, len);
        close_fd(fd);
        let map = map?;

        let (capacity, slot_size) = {
            // SAFETY: mapping holds at least a header, written by the creator.
            let header = unsafe { &*map.ptr.cast::<Header>() };
            if header.magic.load(Ordering::Acquire) != MAGIC {
                return Err(CryptionError::Format(format!(
                    "'{name}' is not a task queue segment"
                )));
            }
            (
                header.capacity.load(Ordering::Acquire) as usize,
                header.slot_size.load(Ordering::Acquire) as usize,
            )
        };
        if slot_size != SLOT_SIZE || len < HEADER_SIZE + capacity * SLOT_SIZE || capacity == 0 {
            return Err(CryptionError::Format(format!(
                "shared queue '{name}' has an incompatible layout"
            )));
        }

        let items = NamedSemaphore::open(os_name(name, ".items")?)?;
        let slots = NamedSemaphore::open(os_name(name, ".slots")?)?;
        let lock = NamedSemaphore::open(os_name(name, ".lock")?)?;

        debug!(name, capacity, "attached to shared task queue");
        Ok(Self {
            name: name.to_owned(),
            capacity,
            owner: false,
            map,
            items,
            slots,
            lock,
        })
    }

    /// Create a queue under a fresh [`unique_name`].
    pub fn create_unique(capacity: usize) -> Result<Self, CryptionError> {
        Self::create(&unique_name(), capacity)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    fn header(&self) -> &Header {
        // SAFETY: the mapping starts with an initialized Header for as long
        // as `self.map` is alive; all fields are atomics.
        unsafe { &*self.map.ptr.cast::<Header>() }
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.capacity);
        // SAFETY: index < capacity, and the mapping is
        // HEADER_SIZE + capacity * SLOT_SIZE bytes long.
        unsafe { self.map.ptr.add(HEADER_SIZE + index * SLOT_SIZE) }
    }

    /// Run `f` inside the cross-process exclusive region.
    fn locked<T>(&self, f: impl FnOnce() -> T) -> Result<T, CryptionError> {
        self.lock.wait()?;
        let out = f();
        self.lock.post()?;
        Ok(out)
    }

    /// Write `record` at `tail`. Caller holds `lock` and a free slot.
    fn push_locked(&self, record: &[u8]) {
        let header = self.header();
        let tail = header.tail.load(Ordering::Relaxed) as usize;
        let slot = self.slot_ptr(tail);
        // SAFETY: slot has SLOT_SIZE bytes; record.len() <= MAX_DESCRIPTOR_LEN
        // was checked by the caller; we hold the lock.
        unsafe {
            ptr::copy_nonoverlapping((record.len() as u32).to_le_bytes().as_ptr(), slot, SLOT_PREFIX);
            ptr::copy_nonoverlapping(record.as_ptr(), slot.add(SLOT_PREFIX), record.len());
        }
        header
            .tail
            .store(((tail + 1) % self.capacity) as u32, Ordering::Relaxed);
        header.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the record at `head` and advance. Caller holds `lock` and an item.
    fn pop_locked(&self) -> Result<Vec<u8>, CryptionError> {
        let header = self.header();
        let head = header.head.load(Ordering::Relaxed) as usize;
        let slot = self.slot_ptr(head);

        let mut len_bytes = [0u8; SLOT_PREFIX];
        // SAFETY: slot has at least SLOT_PREFIX bytes; we hold the lock.
        unsafe { ptr::copy_nonoverlapping(slot, len_bytes.as_mut_ptr(), SLOT_PREFIX) };
        let len = u32::from_le_bytes(len_bytes) as usize;

        // Advance regardless, so a corrupt slot is consumed rather than wedging the ring
        header
            .head
            .store(((head + 1) % self.capacity) as u32, Ordering::Relaxed);
        header.count.fetch_sub(1, Ordering::Relaxed);

        if len > MAX_DESCRIPTOR_LEN {
            return Err(CryptionError::Format(format!(
                "queue slot {head} declares {len} bytes"
            )));
        }
        let mut record = vec![0u8; len];
        // SAFETY: len <= MAX_DESCRIPTOR_LEN fits the slot; we hold the lock.
        unsafe { ptr::copy_nonoverlapping(slot.add(SLOT_PREFIX), record.as_mut_ptr(), len) };
        Ok(record)
    }

    /// Shared tail of `dequeue`/`try_drain_once` once an item is reserved.
    fn take_reserved(&self) -> Result<TaskDescriptor, CryptionError> {
        let record = self.locked(|| self.pop_locked())?;
        self.slots.post()?;
        TaskDescriptor::decode(&record?)
    }
}

impl TaskQueue for SharedQueue {
    fn enqueue(&self, task: &TaskDescriptor) -> Result<(), CryptionError> {
        let record = task.encode();
        if record.len() > MAX_DESCRIPTOR_LEN {
            return Err(CryptionError::Format(format!(
                "descriptor of {} bytes does not fit a queue slot",
                record.len()
            )));
        }

        self.slots.wait()?;
        self.locked(|| self.push_locked(&record))?;
        self.items.post()?;
        Ok(())
    }

    fn dequeue(&self) -> Result<TaskDescriptor, CryptionError> {
        self.items.wait()?;
        self.take_reserved()
    }

    fn try_drain_once(&self) -> Result<Option<TaskDescriptor>, CryptionError> {
        if !self.items.try_wait()? {
            return Ok(None);
        }
        self.take_reserved().map(Some)
    }

    fn len(&self) -> usize {
        self.header().count.load(Ordering::Relaxed) as usize
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn shared_name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Drop for SharedQueue {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        let left = self.len();
        if left > 0 {
            warn!(name = %self.name, left, "tearing down shared queue with tasks still queued");
        }
        self.items.unlink();
        self.slots.unlink();
        self.lock.unlink();
        if let Ok(shm_name) = os_name(&self.name, "") {
            // SAFETY: valid C string.
            unsafe { libc::shm_unlink(shm_name.as_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Action;

    fn task(name: &str) -> TaskDescriptor {
        TaskDescriptor::new(Action::Decrypt, name).unwrap()
    }

    #[test]
    fn create_enqueue_attach_dequeue() {
        let owner = SharedQueue::create_unique(4).unwrap();
        owner.enqueue(&task("one")).unwrap();
        owner.enqueue(&task("two")).unwrap();

        let attached = SharedQueue::open(owner.name()).unwrap();
        assert!(!attached.is_owner());
        assert_eq!(attached.capacity(), 4);
        assert_eq!(attached.len(), 2);
        assert_eq!(attached.dequeue().unwrap(), task("one"));
        assert_eq!(owner.try_drain_once().unwrap(), Some(task("two")));
        assert_eq!(attached.try_drain_once().unwrap(), None);
    }

    /// Overwrite the length prefix of slot `index` through `queue`'s mapping.
    fn set_slot_len(queue: &SharedQueue, index: usize, len: u32) {
        // SAFETY: index < capacity; test-only write of the slot prefix.
        unsafe {
            ptr::copy_nonoverlapping(len.to_le_bytes().as_ptr(), queue.slot_ptr(index), SLOT_PREFIX)
        };
    }

    #[test]
    fn corrupt_slot_is_consumed_and_ring_keeps_going() {
        let owner = SharedQueue::create_unique(3).unwrap();
        for name in ["one", "two", "three"] {
            owner.enqueue(&task(name)).unwrap();
        }

        let attached = SharedQueue::open(owner.name()).unwrap();
        set_slot_len(&attached, 0, u32::MAX);
        set_slot_len(&attached, 1, 2);

        assert!(matches!(attached.try_drain_once(), Err(CryptionError::Format(_))));
        assert_eq!(owner.len(), 2);
        assert!(matches!(attached.try_drain_once(), Err(CryptionError::Format(_))));
        assert_eq!(owner.len(), 1);
        assert_eq!(owner.try_drain_once().unwrap(), Some(task("three")));
        assert_eq!(owner.try_drain_once().unwrap(), None);

        // Both bad slots went back to producers.
        for name in ["four", "five", "six"] {
            owner.enqueue(&task(name)).unwrap();
        }
        assert_eq!(attached.dequeue().unwrap(), task("four"));
    }

    #[test]
    fn drain_loop_reports_malformed_record_and_continues() {
        use crate::aliases::Aes256Key32;
        use crate::dispatcher::{DrainLoop, TaskFailure, TaskOutcome};
        use crate::error::ErrorKind;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, b"data").unwrap();

        let queue = SharedQueue::create_unique(2).unwrap();
        queue.enqueue(&task("bogus")).unwrap();
        queue
            .enqueue(&TaskDescriptor::new(Action::Encrypt, &good).unwrap())
            .unwrap();
        set_slot_len(&queue, 0, u32::MAX);

        let queue: Arc<dyn TaskQueue> = Arc::new(queue);
        let key = Arc::new(Aes256Key32::new([9u8; 32]));
        let outcomes = DrainLoop::new(Arc::clone(&queue), key).run();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            &outcomes[0],
            TaskOutcome::Failed(TaskFailure { path: None, kind: ErrorKind::Format, .. })
        ));
        assert!(outcomes[1].is_success());
        assert!(queue.is_empty());
        assert_eq!(std::fs::read(&good).unwrap().len(), 32);
    }

    #[test]
    fn names_are_removed_on_owner_drop() {
        let name = unique_name();
        drop(SharedQueue::create(&name, 2).unwrap());
        assert!(SharedQueue::open(&name).is_err());
    }

    #[test]
    fn duplicate_create_fails() {
        let q = SharedQueue::create_unique(1).unwrap();
        assert!(SharedQueue::create(q.name(), 1).is_err());
    }

    #[test]
    fn bad_names_rejected() {
        assert!(matches!(
            SharedQueue::create("a/b", 1),
            Err(CryptionError::Config(_))
        ));
        assert!(matches!(
            SharedQueue::create("", 1),
            Err(CryptionError::Config(_))
        ));
    }
}

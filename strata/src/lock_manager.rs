//! Page-granularity two-phase locking.
//!
//! Each page gets its own mutex-guarded reader/writer sets and two
//! condition variables. Locks are held by transactions, not threads, are
//! reentrant per transaction, and a shared lock can be upgraded to
//! exclusive by its sole reader. Waiters block with a randomized bounded
//! timeout; timing out aborts the acquisition, which is also how
//! deadlocks are resolved. There is no cycle detector.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::{thread_rng, Rng};

use crate::error::DbError;
use crate::transaction::TransactionId;
use crate::PageId;

/// Default bounds, in milliseconds, for the per-attempt lock wait.
/// Each wait draws uniformly from the range so that two competing
/// upgraders do not retry in lockstep.
pub const LOCK_TIMEOUT_MIN_MS: u64 = 100;
pub const LOCK_TIMEOUT_MAX_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Default)]
struct LockState {
    readers: HashSet<TransactionId>,
    writers: HashSet<TransactionId>,
    writers_waiting: usize,
}

impl LockState {
    /// A shared request proceeds if the requester already writes the
    /// page, or no writer holds it and none is waiting (writer priority
    /// keeps a stream of readers from starving writers).
    fn shared_grantable(&self, tid: TransactionId) -> bool {
        self.writers.contains(&tid) || (self.writers_waiting == 0 && self.writers.is_empty())
    }

    /// An exclusive request proceeds if no writer holds the page and
    /// either nobody reads it or the requester is the only reader (the
    /// upgrade case).
    fn exclusive_grantable(&self, tid: TransactionId) -> bool {
        self.writers.is_empty()
            && (self.readers.is_empty()
                || (self.readers.len() == 1 && self.readers.contains(&tid)))
    }
}

#[derive(Debug, Default)]
struct PageLock {
    state: Mutex<LockState>,
    /// Signalled when the readers drop to at most one; exclusive
    /// waiters (including upgraders) block here.
    no_readers: Condvar,
    /// Signalled when a writer releases or gives up; shared waiters
    /// block here.
    no_writers: Condvar,
}

/// Manages page locks for the buffer pool.
pub struct LockManager {
    locks: Mutex<HashMap<PageId, Arc<PageLock>>>,
    held: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
    timeout_min_ms: u64,
    timeout_max_ms: u64,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_timeouts(LOCK_TIMEOUT_MIN_MS, LOCK_TIMEOUT_MAX_MS)
    }

    /// Custom wait bounds, mainly for tests that want fast aborts.
    pub fn with_timeouts(timeout_min_ms: u64, timeout_max_ms: u64) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            timeout_min_ms: timeout_min_ms.min(timeout_max_ms),
            timeout_max_ms: timeout_max_ms.max(timeout_min_ms),
        }
    }

    fn page_lock(&self, pid: PageId) -> Arc<PageLock> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(pid).or_default())
    }

    fn wait_timeout(&self) -> Duration {
        let ms = thread_rng().gen_range(self.timeout_min_ms..=self.timeout_max_ms);
        Duration::from_millis(ms)
    }

    fn note_held(&self, tid: TransactionId, pid: PageId) {
        self.held.lock().entry(tid).or_default().insert(pid);
    }

    fn note_released(&self, tid: TransactionId, pid: PageId) {
        let mut held = self.held.lock();
        if let Some(pages) = held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                held.remove(&tid);
            }
        }
    }

    /// Blocks until the lock is granted. Fails with
    /// [`DbError::TransactionAborted`] when a wait times out; the caller
    /// must then abort the transaction.
    pub fn acquire(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<(), DbError> {
        let lock = self.page_lock(pid);
        let mut state = lock.state.lock();

        match mode {
            LockMode::Shared => {
                if state.readers.contains(&tid) {
                    return Ok(());
                }
                while !state.shared_grantable(tid) {
                    let timeout = self.wait_timeout();
                    if lock.no_writers.wait_for(&mut state, timeout).timed_out() {
                        crate::strata_debug_log!(
                            "[LockManager] {} timed out waiting for shared on {:?}",
                            tid,
                            pid
                        );
                        return Err(DbError::TransactionAborted);
                    }
                }
                state.readers.insert(tid);
            }
            LockMode::Exclusive => {
                if state.writers.contains(&tid) {
                    return Ok(());
                }
                state.writers_waiting += 1;
                while !state.exclusive_grantable(tid) {
                    let timeout = self.wait_timeout();
                    if lock.no_readers.wait_for(&mut state, timeout).timed_out() {
                        state.writers_waiting -= 1;
                        // Shared waiters queue behind writers_waiting;
                        // wake them so they re-check instead of idling
                        // into their own timeouts.
                        lock.no_writers.notify_all();
                        crate::strata_debug_log!(
                            "[LockManager] {} timed out waiting for exclusive on {:?}",
                            tid,
                            pid
                        );
                        return Err(DbError::TransactionAborted);
                    }
                }
                state.writers_waiting -= 1;
                state.writers.insert(tid);
            }
        }

        drop(state);
        self.note_held(tid, pid);
        Ok(())
    }

    /// Releases whatever the transaction holds on the page. A release
    /// of a lock that is not held is a no-op.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let lock = self.page_lock(pid);
        let mut state = lock.state.lock();

        if state.readers.remove(&tid) && state.readers.len() <= 1 {
            // The remaining reader may be an upgrader blocked on
            // no_readers.
            lock.no_readers.notify_all();
        }
        if state.writers.remove(&tid) {
            lock.no_readers.notify_all();
            lock.no_writers.notify_all();
        }

        drop(state);
        self.note_released(tid, pid);
    }

    /// Releases every page the transaction holds.
    pub fn release_all(&self, tid: TransactionId) {
        let pages: Vec<PageId> = self
            .held
            .lock()
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for pid in pages {
            self.release(tid, pid);
        }
    }

    /// True if the transaction holds the page in any mode.
    pub fn holds(&self, tid: TransactionId, pid: PageId) -> bool {
        let lock = self.page_lock(pid);
        let state = lock.state.lock();
        state.readers.contains(&tid) || state.writers.contains(&tid)
    }

    pub fn is_exclusively_locked(&self, pid: PageId) -> bool {
        let lock = self.page_lock(pid);
        let result = !lock.state.lock().writers.is_empty();
        result
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

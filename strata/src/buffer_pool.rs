//! The buffer pool: a bounded cache of heap pages and the front door
//! for every page access.
//!
//! Fetching a page first acquires the page lock (shared for read-only,
//! exclusive otherwise) and only then touches the pool state, so the
//! pool mutex is never held across a blocking lock wait. Eviction is
//! NO-STEAL: a page dirtied by an uncommitted transaction is never
//! written back, which makes abort a matter of dropping the page and
//! re-reading the committed image from disk.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::catalog::Catalog;
use crate::error::DbError;
use crate::lock_manager::{LockManager, LockMode};
use crate::page::HeapPage;
use crate::transaction::TransactionId;
use crate::tuple::Tuple;
use crate::PageId;

/// Default number of pages a pool holds.
pub const DEFAULT_PAGES: usize = 50;

/// Requested access level for a page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

impl Permissions {
    fn lock_mode(&self) -> LockMode {
        match self {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// A cached page, shared between the pool and everyone who fetched it.
/// The transactional lock manager serializes conflicting access; the
/// `RwLock` only guards the in-memory representation.
pub type SharedPage = Arc<RwLock<HeapPage>>;

#[derive(Default)]
struct PoolState {
    pages: HashMap<PageId, SharedPage>,
    /// Insertion-ordered ids, least recently touched first.
    lru: VecDeque<PageId>,
}

impl PoolState {
    fn touch(&mut self, pid: PageId) {
        self.lru.retain(|p| *p != pid);
        self.lru.push_back(pid);
    }

    fn forget(&mut self, pid: PageId) {
        self.lru.retain(|p| *p != pid);
        self.pages.remove(&pid);
    }

    /// Drops the oldest clean page. Fails when every resident page is
    /// dirty: writing one out would leak uncommitted data (NO-STEAL).
    fn evict(&mut self) -> Result<(), DbError> {
        let victim = self
            .lru
            .iter()
            .copied()
            .find(|pid| {
                self.pages
                    .get(pid)
                    .map(|page| page.read().is_dirty().is_none())
                    .unwrap_or(false)
            })
            .ok_or_else(|| DbError::Storage("no clean page to evict".into()))?;
        crate::strata_debug_log!("[BufferPool] evicting {:?}", victim);
        self.forget(victim);
        Ok(())
    }
}

pub struct BufferPool {
    max_pages: usize,
    catalog: Arc<Catalog>,
    locks: LockManager,
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, max_pages: usize) -> Self {
        Self::with_lock_manager(catalog, max_pages, LockManager::new())
    }

    /// A pool whose lock waits use custom timeout bounds; concurrency
    /// tests use this to get fast deadlock aborts.
    pub fn with_lock_timeouts(
        catalog: Arc<Catalog>,
        max_pages: usize,
        timeout_min_ms: u64,
        timeout_max_ms: u64,
    ) -> Self {
        Self::with_lock_manager(
            catalog,
            max_pages,
            LockManager::with_timeouts(timeout_min_ms, timeout_max_ms),
        )
    }

    fn with_lock_manager(catalog: Arc<Catalog>, max_pages: usize, locks: LockManager) -> Self {
        Self {
            max_pages,
            catalog,
            locks,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of pages currently resident.
    pub fn cached_pages(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Fetches a page on behalf of a transaction, locking it in the
    /// mode the permissions call for. Blocks while the lock is
    /// contended and fails with [`DbError::TransactionAborted`] when the
    /// wait times out.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> Result<SharedPage, DbError> {
        self.locks.acquire(tid, pid, perm.lock_mode())?;

        let mut state = self.state.lock();
        if let Some(page) = state.pages.get(&pid) {
            let page = Arc::clone(page);
            state.touch(pid);
            return Ok(page);
        }

        if state.pages.len() >= self.max_pages {
            state.evict()?;
        }

        let file = self.catalog.file(pid.table_id())?;
        let page = file.read_page(pid).map_err(|e| match e {
            DbError::Io(err) => {
                DbError::Storage(format!("failed to read page {:?}: {}", pid, err))
            }
            other => other,
        })?;

        let page = Arc::new(RwLock::new(page));
        state.pages.insert(pid, Arc::clone(&page));
        state.lru.push_back(pid);
        Ok(page)
    }

    /// Extends the table's heap file by one empty page, locks it
    /// exclusively for `tid`, and returns it.
    pub fn add_empty_page(
        &self,
        tid: TransactionId,
        table_id: u32,
    ) -> Result<SharedPage, DbError> {
        let file = self.catalog.file(table_id)?;
        let page_no = file.append_page()?;
        let pid = PageId::new(table_id, page_no);
        self.locks.acquire(tid, pid, LockMode::Exclusive)?;
        self.get_page(tid, pid, Permissions::ReadWrite)
    }

    /// Routes a tuple insert through the table's heap file and marks
    /// the dirtied pages with the inserting transaction.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: u32,
        tuple: Tuple,
    ) -> Result<(), DbError> {
        let file = self.catalog.file(table_id)?;
        let dirtied = file.insert_tuple(tid, tuple, self)?;
        for page in dirtied {
            page.write().mark_dirty(Some(tid));
        }
        Ok(())
    }

    /// Deletes the tuple named by its record id and marks the page
    /// dirty. The tuple's record id is cleared.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &mut Tuple) -> Result<(), DbError> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidArgument("tuple has no record id".into()))?;
        let file = self.catalog.file(rid.page_id().table_id())?;
        let page = file.delete_tuple(tid, tuple, self)?;
        page.write().mark_dirty(Some(tid));
        Ok(())
    }

    /// Commits or aborts a transaction: on commit its dirty pages are
    /// flushed and marked clean; on abort they are discarded so the next
    /// read reloads the committed image. Either way every lock the
    /// transaction holds is released.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<(), DbError> {
        crate::strata_debug_log!(
            "[BufferPool] completing {} (commit: {})",
            tid,
            commit
        );
        let result = {
            let mut state = self.state.lock();
            let dirtied: Vec<PageId> = state
                .pages
                .iter()
                .filter(|(_, page)| page.read().is_dirty() == Some(tid))
                .map(|(pid, _)| *pid)
                .collect();

            let mut result = Ok(());
            for pid in dirtied {
                if commit {
                    if let Err(e) = self.flush_page_locked(&mut state, pid) {
                        result = Err(e);
                        break;
                    }
                } else {
                    state.forget(pid);
                }
            }
            result
        };

        self.locks.release_all(tid);
        result
    }

    /// Writes one resident page out if it is dirty. Caller holds the
    /// pool mutex.
    fn flush_page_locked(&self, state: &mut PoolState, pid: PageId) -> Result<(), DbError> {
        let Some(page) = state.pages.get(&pid) else {
            return Ok(());
        };
        let mut page = page.write();
        if page.is_dirty().is_none() {
            return Ok(());
        }
        let file = self.catalog.file(pid.table_id())?;
        file.write_page(&page).map_err(|e| match e {
            DbError::Io(err) => {
                DbError::Storage(format!("failed to flush page {:?}: {}", pid, err))
            }
            other => other,
        })?;
        page.mark_dirty(None);
        page.set_before_image();
        Ok(())
    }

    /// Flushes every dirty resident page. Breaks NO-STEAL if any of
    /// them belong to live transactions; meant for shutdown and tests.
    pub fn flush_all_pages(&self) -> Result<(), DbError> {
        let mut state = self.state.lock();
        let pids: Vec<PageId> = state.pages.keys().copied().collect();
        for pid in pids {
            self.flush_page_locked(&mut state, pid)?;
        }
        Ok(())
    }

    /// Flushes the pages dirtied by one transaction without ending it.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<(), DbError> {
        let mut state = self.state.lock();
        let dirtied: Vec<PageId> = state
            .pages
            .iter()
            .filter(|(_, page)| page.read().is_dirty() == Some(tid))
            .map(|(pid, _)| *pid)
            .collect();
        for pid in dirtied {
            self.flush_page_locked(&mut state, pid)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, pid: PageId) {
        self.state.lock().forget(pid);
    }

    /// True if the transaction holds a lock of any mode on the page.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.locks.holds(tid, pid)
    }

    /// Releases a single page lock early. Risky: only correct for pages
    /// the transaction has neither modified nor observed in a way that
    /// matters, such as fully probed insert candidates.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.locks.release(tid, pid);
    }
}

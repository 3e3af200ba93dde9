//! Heap files: one flat file of pages per table, in no particular
//! tuple order. The file length is always a whole number of pages.

use std::collections::HashMap;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::buffer_pool::{BufferPool, Permissions, SharedPage};
use crate::error::DbError;
use crate::failpoint;
use crate::page::HeapPage;
use crate::transaction::TransactionId;
use crate::tuple::{Schema, Tuple};
use crate::{PageId, PAGE_SIZE};

static NEXT_TABLE_ID: AtomicU32 = AtomicU32::new(0);

/// Table ids are memoized by canonical path: reopening the same file
/// yields the same id for as long as the process lives.
fn assigned_ids() -> &'static Mutex<HashMap<PathBuf, u32>> {
    static IDS: OnceLock<Mutex<HashMap<PathBuf, u32>>> = OnceLock::new();
    IDS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub struct HeapFile {
    file: Mutex<File>,
    schema: Arc<Schema>,
    id: u32,
}

impl HeapFile {
    /// Opens (creating if necessary) the heap file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self, DbError> {
        let path_ref = path.as_ref();
        crate::strata_debug_log!("[HeapFile::open] opening {:?}", path_ref);
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        let canonical = path_ref.canonicalize()?;
        let id = {
            let mut ids = assigned_ids().lock();
            *ids.entry(canonical)
                .or_insert_with(|| NEXT_TABLE_ID.fetch_add(1, Ordering::SeqCst))
        };

        Ok(Self {
            file: Mutex::new(file),
            schema: Arc::new(schema),
            id,
        })
    }

    /// The table id this file was registered under.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_pages(&self) -> Result<usize, DbError> {
        let file = self.file.lock();
        Ok(file.metadata()?.len() as usize / PAGE_SIZE)
    }

    /// Reads one page image from disk.
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage, DbError> {
        if pid.table_id() != self.id {
            return Err(DbError::InvalidArgument(format!(
                "page {:?} does not belong to table {}",
                pid, self.id
            )));
        }
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        let offset = pid.page_no() as u64 * PAGE_SIZE as u64;
        if offset + PAGE_SIZE as u64 > len {
            return Err(DbError::InvalidArgument(format!(
                "page {} is beyond the end of table {}",
                pid.page_no(),
                self.id
            )));
        }

        let mut data = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut data)?;
        drop(file);

        HeapPage::new(pid, &data, Arc::clone(&self.schema))
    }

    /// Writes the page's serialized bytes back to its file slot.
    pub fn write_page(&self, page: &HeapPage) -> Result<(), DbError> {
        failpoint::maybe_fail("heap_file.write_page")?;
        let pid = page.id();
        crate::strata_debug_log!("[HeapFile::write_page] writing {:?}", pid);
        let data = page.page_data();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pid.page_no() as u64 * PAGE_SIZE as u64))?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }

    /// Appends one zero-filled page and returns its page number. The
    /// file mutex serializes concurrent appends.
    pub fn append_page(&self) -> Result<u32, DbError> {
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&HeapPage::empty_page_data())?;
        file.sync_all()?;
        let page_no = (len / PAGE_SIZE as u64) as u32;
        crate::strata_debug_log!(
            "[HeapFile::append_page] table {} grew to page {}",
            self.id,
            page_no
        );
        Ok(page_no)
    }

    /// Finds (or creates) a page with a free slot and stores the tuple,
    /// returning the pages dirtied on the way.
    ///
    /// Pages are probed under a SHARED lock; a fully-probed page is of
    /// no further use to this transaction, so its probe lock is given
    /// back immediately. A lock the transaction already held before the
    /// probe is kept, as strict two-phase locking requires.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<SharedPage>, DbError> {
        let num_pages = self.num_pages()?;
        for page_no in 0..num_pages {
            let pid = PageId::new(self.id, page_no as u32);
            let held_before = pool.holds_lock(tid, pid);
            let page = pool.get_page(tid, pid, Permissions::ReadOnly)?;
            let has_room = page.read().num_empty_slots() > 0;
            if !has_room {
                if !held_before {
                    pool.release_page(tid, pid);
                }
                continue;
            }

            let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            let mut guard = page.write();
            // The slot may have been taken between the probe and the
            // exclusive re-acquire.
            if guard.num_empty_slots() > 0 {
                guard.insert_tuple(tuple)?;
                drop(guard);
                return Ok(vec![page]);
            }
        }

        let page = pool.add_empty_page(tid, self.id)?;
        let mut guard = page.write();
        guard.insert_tuple(tuple)?;
        drop(guard);
        Ok(vec![page])
    }

    /// Deletes the tuple named by its record id, returning the dirtied
    /// page.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        pool: &BufferPool,
    ) -> Result<SharedPage, DbError> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidArgument("tuple has no record id".into()))?;
        if rid.page_id().table_id() != self.id {
            return Err(DbError::InvalidArgument(format!(
                "tuple belongs to table {}, not {}",
                rid.page_id().table_id(),
                self.id
            )));
        }

        let page = pool.get_page(tid, rid.page_id(), Permissions::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(page)
    }
}

/// A restartable cursor over every stored tuple of a heap file, in
/// ascending (page, slot) order. Pages are pulled through the buffer
/// pool with read-only permission as the cursor reaches them.
pub struct HeapFileScan {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    next_page: u32,
    current: Option<std::vec::IntoIter<Tuple>>,
    opened: bool,
}

impl HeapFileScan {
    pub fn new(file: Arc<HeapFile>, tid: TransactionId, pool: Arc<BufferPool>) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            current: None,
            opened: false,
        }
    }

    pub fn open(&mut self) -> Result<(), DbError> {
        self.opened = true;
        self.next_page = 0;
        self.current = None;
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.opened {
            return Err(DbError::InvalidState("scan is not open".into()));
        }
        loop {
            if let Some(iter) = &mut self.current {
                if let Some(tuple) = iter.next() {
                    return Ok(Some(tuple));
                }
            }
            if self.next_page as usize >= self.file.num_pages()? {
                return Ok(None);
            }
            let pid = PageId::new(self.file.id(), self.next_page);
            self.next_page += 1;
            let page = self.pool.get_page(self.tid, pid, Permissions::ReadOnly)?;
            let tuples: Vec<Tuple> = page.read().iter().cloned().collect();
            self.current = Some(tuples.into_iter());
        }
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        if !self.opened {
            return Err(DbError::InvalidState("scan was never opened".into()));
        }
        self.next_page = 0;
        self.current = None;
        Ok(())
    }

    pub fn close(&mut self) {
        self.opened = false;
        self.current = None;
    }
}

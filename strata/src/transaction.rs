//! Transaction identifiers and the transaction handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer_pool::BufferPool;
use crate::error::DbError;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(0);

/// An opaque, process-unique transaction identifier. Value equality is
/// all that matters; ids scope locks and dirty-page ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Pairs a fresh transaction id with the buffer pool it runs against.
/// Committing flushes the transaction's dirty pages; aborting discards
/// them. Either way all of its locks are released.
pub struct Transaction {
    tid: TransactionId,
    pool: Arc<BufferPool>,
}

impl Transaction {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            tid: TransactionId::new(),
            pool,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tid
    }

    pub fn commit(self) -> Result<(), DbError> {
        self.pool.transaction_complete(self.tid, true)
    }

    pub fn abort(self) -> Result<(), DbError> {
        self.pool.transaction_complete(self.tid, false)
    }
}

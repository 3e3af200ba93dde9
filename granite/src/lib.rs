//! # Granite
//! Pull-based relational operators over the strata storage engine:
//! sequential scan, filter, nested-loop join, aggregation, insert and
//! delete, composed through one iterator contract.

/// Hash aggregation.
pub mod aggregate;
/// The insert and delete operators.
pub mod dml;
/// Execution-layer errors.
pub mod errors;
/// The relational select.
pub mod filter;
/// Selectivity histograms for the external optimizer.
pub mod histogram;
/// Nested-loop join.
pub mod join;
/// The pull-iterator contract.
pub mod operator;
/// Comparison predicates.
pub mod predicate;
/// Sequential table scan.
pub mod scan;

pub use aggregate::{Aggregate, AggregateOp};
pub use dml::{Delete, Insert};
pub use errors::ExecError;
pub use filter::Filter;
pub use histogram::IntHistogram;
pub use join::Join;
pub use operator::Operator;
pub use predicate::{JoinPredicate, Predicate, PredicateOp};
pub use scan::SeqScan;

use std::sync::Arc;

use strata::{BufferPool, Catalog, Transaction};

/// The execution environment: one catalog and the buffer pool built
/// over it. Handles are cloned into operator constructors; nothing
/// lives in process globals.
pub struct Database {
    catalog: Arc<Catalog>,
    pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(pool_capacity: usize) -> Self {
        let catalog = Arc::new(Catalog::new());
        let pool = Arc::new(BufferPool::new(Arc::clone(&catalog), pool_capacity));
        Self { catalog, pool }
    }

    /// Like [`Database::new`] with custom lock-wait bounds; concurrency
    /// tests use this for fast deadlock aborts.
    pub fn with_lock_timeouts(
        pool_capacity: usize,
        timeout_min_ms: u64,
        timeout_max_ms: u64,
    ) -> Self {
        let catalog = Arc::new(Catalog::new());
        let pool = Arc::new(BufferPool::with_lock_timeouts(
            Arc::clone(&catalog),
            pool_capacity,
            timeout_min_ms,
            timeout_max_ms,
        ));
        Self { catalog, pool }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Starts a transaction against this database's pool.
    pub fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.pool))
    }
}

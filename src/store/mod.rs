//! Cache store: durable per-bucket values
//!
//! The cache store holds one [`CachedBucket`] row per (query identity,
//! bucket instant) pair. Rows are append-only: a bucket's true historical
//! value cannot change once its period has fully elapsed, so rows are never
//! updated in place and are deleted only by an explicit per-report clear.
//!
//! All engine work against the store happens inside one
//! [`CacheTransaction`]: reads, computation and writes either commit
//! together or not at all, so a failing aggregation never leaves partial
//! values behind.

mod memory;

pub use memory::MemoryCacheStore;

use crate::error::StoreError;
use crate::types::{AggregationKind, Grouping, QueryIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted bucket value
///
/// The tuple (entity, report, grouping, aggregation, conditions fingerprint,
/// bucket instant) is unique: at most one cached value per distinct query
/// identity per bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBucket {
    /// Name of the reported-on collection
    pub entity: String,
    /// Name of the report definition
    pub report: String,
    /// Bucket granularity
    pub grouping: Grouping,
    /// Aggregation kind
    pub aggregation: AggregationKind,
    /// Stable serialization of the filter conditions, empty if none
    pub conditions_fingerprint: String,
    /// Aligned start instant of the bucket
    pub bucket_instant: DateTime<Utc>,
    /// The aggregated value
    pub value: f64,
}

impl CachedBucket {
    /// Build a row for a query identity and bucket
    pub fn new(identity: &QueryIdentity, bucket_instant: DateTime<Utc>, value: f64) -> Self {
        Self {
            entity: identity.entity.clone(),
            report: identity.report.clone(),
            grouping: identity.grouping,
            aggregation: identity.aggregation,
            conditions_fingerprint: identity.conditions_fingerprint.clone(),
            bucket_instant,
            value,
        }
    }
}

/// Outcome of an insert-if-absent write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written
    Inserted,
    /// A row with the same identity and bucket instant already exists
    ///
    /// Expected under concurrent callers computing the same missing bucket;
    /// the uniqueness invariant makes the losing insert a no-op.
    AlreadyPresent,
}

/// A cache store that can open read-modify-write transactions
pub trait CacheStore: Send + Sync {
    /// Open a transaction
    ///
    /// Dropping the returned transaction without calling
    /// [`CacheTransaction::commit`] discards its writes.
    fn transaction(&self) -> Result<Box<dyn CacheTransaction + '_>, StoreError>;
}

/// One atomic read-modify-write unit against the cache store
pub trait CacheTransaction {
    /// Read rows for an identity with `from <= bucket_instant <= to`,
    /// ascending by instant, capped at `limit` rows
    ///
    /// `to = None` leaves the range open above.
    fn read_range(
        &mut self,
        identity: &QueryIdentity,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<CachedBucket>, StoreError>;

    /// Insert a row unless one already exists for its identity and instant
    fn insert(&mut self, row: CachedBucket) -> Result<InsertOutcome, StoreError>;

    /// Delete all rows for (entity, report), returning the count removed
    fn clear(&mut self, entity: &str, report: &str) -> Result<u64, StoreError>;

    /// Commit the transaction's writes
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

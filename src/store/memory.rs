//! In-memory cache store
//!
//! A [`MemoryCacheStore`] keeps all rows in a `BTreeMap` behind a
//! `parking_lot` mutex. A transaction holds the lock for its whole lifetime,
//! which gives single-writer serializability; writes are staged and applied
//! on commit, so a dropped transaction leaves the store untouched.
//!
//! Not durable: all rows are lost on restart. Intended for tests,
//! development and single-process deployments.

use super::{CacheStore, CacheTransaction, CachedBucket, InsertOutcome};
use crate::error::StoreError;
use crate::types::QueryIdentity;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;

/// Row key: identity columns plus the bucket instant
///
/// Ordered so that all rows of one identity are contiguous and sorted by
/// instant, which makes identity range reads a plain `BTreeMap` range scan.
type RowKey = (String, String, String, String, String, DateTime<Utc>);

fn row_key(identity: &QueryIdentity, instant: DateTime<Utc>) -> RowKey {
    (
        identity.entity.clone(),
        identity.report.clone(),
        identity.grouping.identifier().to_string(),
        identity.aggregation.identifier().to_string(),
        identity.conditions_fingerprint.clone(),
        instant,
    )
}

fn row_from_key(key: &RowKey, value: f64) -> CachedBucket {
    CachedBucket {
        entity: key.0.clone(),
        report: key.1.clone(),
        grouping: crate::types::Grouping::from_identifier(&key.2)
            .expect("only valid groupings are stored"),
        aggregation: crate::types::AggregationKind::from_identifier(&key.3)
            .expect("only valid aggregations are stored"),
        conditions_fingerprint: key.4.clone(),
        bucket_instant: key.5,
        value,
    }
}

/// In-memory transactional cache store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    rows: Mutex<BTreeMap<RowKey, f64>>,
}

impl MemoryCacheStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed rows, across all identities
    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }
}

impl CacheStore for MemoryCacheStore {
    fn transaction(&self) -> Result<Box<dyn CacheTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            guard: self.rows.lock(),
            staged: BTreeMap::new(),
            cleared: Vec::new(),
        }))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, BTreeMap<RowKey, f64>>,
    staged: BTreeMap<RowKey, f64>,
    cleared: Vec<(String, String)>,
}

impl MemoryTransaction<'_> {
    fn is_cleared(&self, key: &RowKey) -> bool {
        self.cleared
            .iter()
            .any(|(entity, report)| key.0 == *entity && key.1 == *report)
    }
}

impl CacheTransaction for MemoryTransaction<'_> {
    fn read_range(
        &mut self,
        identity: &QueryIdentity,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<CachedBucket>, StoreError> {
        let low = row_key(identity, from);
        let high = row_key(identity, to.unwrap_or(DateTime::<Utc>::MAX_UTC));

        let mut rows: Vec<CachedBucket> = self
            .guard
            .range(low.clone()..=high.clone())
            .filter(|(key, _)| !self.is_cleared(key))
            .map(|(key, value)| row_from_key(key, *value))
            .collect();
        for (key, value) in self.staged.range(low..=high) {
            rows.push(row_from_key(key, *value));
        }
        rows.sort_by_key(|row| row.bucket_instant);
        rows.truncate(limit);
        Ok(rows)
    }

    fn insert(&mut self, row: CachedBucket) -> Result<InsertOutcome, StoreError> {
        let identity = QueryIdentity {
            entity: row.entity.clone(),
            report: row.report.clone(),
            grouping: row.grouping,
            aggregation: row.aggregation,
            conditions_fingerprint: row.conditions_fingerprint.clone(),
        };
        let key = row_key(&identity, row.bucket_instant);
        let committed = self.guard.contains_key(&key) && !self.is_cleared(&key);
        if committed || self.staged.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.staged.insert(key, row.value);
        Ok(InsertOutcome::Inserted)
    }

    fn clear(&mut self, entity: &str, report: &str) -> Result<u64, StoreError> {
        let removed = self
            .guard
            .keys()
            .filter(|key| key.0 == entity && key.1 == report)
            .count() as u64;
        self.staged
            .retain(|key, _| !(key.0 == entity && key.1 == report));
        self.cleared.push((entity.to_string(), report.to_string()));
        Ok(removed)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = *self;
        for (entity, report) in this.cleared.drain(..) {
            this.guard
                .retain(|key, _| !(key.0 == entity && key.1 == report));
        }
        for (key, value) in this.staged {
            this.guard.insert(key, value);
        }
        Ok(())
    }
}

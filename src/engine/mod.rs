//! ReportCache engine: incremental cache and backfill
//!
//! The engine reconciles previously cached bucket values with freshly
//! computed ones and returns a gap-free, ordered series. Per query it
//! decides which buckets are trustworthy from cache, which must be
//! recomputed, and how to persist new values without violating the
//! uniqueness invariant on cache rows.
//!
//! # Algorithm
//!
//! Everything below runs inside one cache-store transaction:
//!
//! 1. Validate the options and, when the end date falls inside the current
//!    bucket, reclassify the query as a live one — a partially elapsed
//!    bucket can never be served from cache.
//! 2. Read cached rows for the query identity from the first wanted bucket
//!    upward, ascending, capped at `limit` rows (skipped entirely for
//!    non-cacheable queries).
//! 3. Decide where fresh computation must begin. The cached tail is only
//!    trusted when it connects unbroken to the point where fresh
//!    computation starts: the rows must be contiguous and, together with
//!    the buckets still missing above them, span exactly `limit` buckets.
//!    Anything else falls back to recomputing the whole wanted range.
//! 4. Invoke the executor at most once, for the missing range only (plus
//!    the open current bucket for live queries). A fully cached query
//!    issues no executor call at all.
//! 5. Merge: walk the wanted buckets oldest to newest, taking cached
//!    values where present and executor values elsewhere (absent means
//!    zero), persisting freshly computed complete buckets via
//!    insert-if-absent. The open current bucket is appended un-persisted
//!    for live queries.

use crate::dialect::DialectAdapter;
use crate::error::{Error, ExecutorError, Result, StoreError, ValidationError};
use crate::executor::BucketValue;
use crate::period::ReportingPeriod;
use crate::report::ReportOptions;
use crate::store::{CacheStore, CacheTransaction, CachedBucket};
use crate::types::{Grouping, QueryIdentity, ResultSeries, SeriesEntry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The incremental reporting cache engine
///
/// Holds no state of its own between calls; all state lives in the cache
/// store. Cloning is cheap and clones share the same store and dialect.
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<dyn CacheStore>,
    dialect: Arc<dyn DialectAdapter>,
}

impl ReportCache {
    /// Create an engine over a cache store and a dialect adapter
    pub fn new(store: Arc<dyn CacheStore>, dialect: Arc<dyn DialectAdapter>) -> Self {
        Self { store, dialect }
    }

    /// The dialect adapter this engine parses bucket keys with
    pub fn dialect(&self) -> Arc<dyn DialectAdapter> {
        Arc::clone(&self.dialect)
    }

    /// Run one query against the cache, backfilling as needed
    ///
    /// `executor` is invoked at most once, with the instant range whose
    /// buckets must be (re)computed; an open upper bound means "through the
    /// still-open current bucket".
    pub fn process<F>(
        &self,
        identity: &QueryIdentity,
        options: &ReportOptions,
        executor: F,
    ) -> Result<ResultSeries>
    where
        F: FnOnce(
            DateTime<Utc>,
            Option<DateTime<Utc>>,
        ) -> std::result::Result<Vec<BucketValue>, ExecutorError>,
    {
        self.process_at(Utc::now(), identity, options, executor)
    }

    /// [`ReportCache::process`] with an explicit "now"
    ///
    /// The reclassification and contiguity rules all hinge on the current
    /// bucket; taking the clock as an argument keeps them deterministic
    /// under test.
    pub fn process_at<F>(
        &self,
        now: DateTime<Utc>,
        identity: &QueryIdentity,
        options: &ReportOptions,
        executor: F,
    ) -> Result<ResultSeries>
    where
        F: FnOnce(
            DateTime<Utc>,
            Option<DateTime<Utc>>,
        ) -> std::result::Result<Vec<BucketValue>, ExecutorError>,
    {
        // Fail fast, before any store access
        if options.limit == 0 {
            return Err(ValidationError::InvalidLimit(0).into());
        }
        if let Some(end) = options.end_date {
            if options.live_data {
                return Err(ValidationError::InvalidEndDate(
                    "an explicit end date cannot be combined with live data".to_string(),
                )
                .into());
            }
            if end > now {
                return Err(ValidationError::InvalidEndDate(format!(
                    "end date {end} is in the future"
                ))
                .into());
            }
        }

        let grouping = options.grouping;
        let limit = options.limit;
        let current = ReportingPeriod::new(grouping, now);

        // An end date inside the still-open current bucket cannot be served
        // from cache; treat the query as a live one instead.
        let (live, end_date) = match options.end_date {
            Some(end) if current.contains(end) => {
                debug!(end = %end, "end date falls in the current bucket; reclassifying as live");
                (true, None)
            }
            other => (options.live_data, other),
        };

        let first_wanted = ReportingPeriod::first(grouping, limit, end_date, now);
        let last_wanted = end_date.map(|end| ReportingPeriod::new(grouping, end));
        // Newest complete bucket the query may return
        let closed_end = last_wanted.unwrap_or_else(|| current.previous());

        let mut tx = self.store.transaction()?;

        let cached = if options.cacheable {
            tx.read_range(
                identity,
                first_wanted.start(),
                last_wanted.map(|period| period.start()),
                limit,
            )?
        } else {
            Vec::new()
        };
        let cached_map: HashMap<DateTime<Utc>, f64> = cached
            .iter()
            .map(|row| (row.bucket_instant, row.value))
            .collect();

        let recompute_from =
            Self::recompute_start(grouping, &cached, first_wanted, closed_end, limit);

        // At most one executor call per process() invocation
        let fresh: HashMap<DateTime<Utc>, f64> = {
            let begin = match recompute_from {
                Some(period) => Some(period),
                None if live => Some(current),
                None => None,
            };
            match begin {
                Some(begin_period) => {
                    let range_end = if live {
                        None
                    } else {
                        Some(closed_end.last_instant())
                    };
                    debug!(
                        from = %begin_period,
                        open_ended = range_end.is_none(),
                        "recomputing bucket range"
                    );
                    let raw = executor(begin_period.start(), range_end)?;
                    self.parse_bucket_values(grouping, raw)?
                }
                None => {
                    debug!(cached = cached.len(), "full cache hit, executor not invoked");
                    HashMap::new()
                }
            }
        };

        let mut entries: Vec<SeriesEntry> = Vec::with_capacity(limit + 1);
        let mut period = first_wanted;
        while period.start() <= closed_end.start() {
            if let Some(&value) = cached_map.get(&period.start()) {
                entries.push(SeriesEntry { period, value });
            } else if recompute_from.map_or(false, |from| period.start() >= from.start()) {
                // Freshly computed complete bucket; absent from the executor
                // result means no records fell into it
                let value = fresh.get(&period.start()).copied().unwrap_or(0.0);
                if options.cacheable {
                    match tx.insert(CachedBucket::new(identity, period.start(), value)) {
                        Ok(_) => {}
                        // A concurrent caller computed the same bucket; the
                        // uniqueness invariant makes our insert a no-op
                        Err(StoreError::WriteConflict { .. }) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
                entries.push(SeriesEntry { period, value });
            }
            // Neither cached nor covered by the executor range: only possible
            // for the oldest candidate bucket of an end-date query, which is
            // about to fall off the front of the window
            period = period.next();
        }

        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        if live {
            // The open bucket is always freshly computed and never persisted
            let value = fresh.get(&current.start()).copied().unwrap_or(0.0);
            entries.push(SeriesEntry {
                period: current,
                value,
            });
        }

        tx.commit()?;
        debug!(
            entity = %identity.entity,
            report = %identity.report,
            entries = entries.len(),
            "assembled result series"
        );
        Ok(ResultSeries::new(&identity.entity, &identity.report, entries))
    }

    /// Drop every cached row for (entity, report)
    pub fn clear(&self, entity: &str, report: &str) -> Result<u64> {
        let mut tx = self.store.transaction()?;
        let removed = tx.clear(entity, report)?;
        tx.commit()?;
        info!(entity, report, removed, "cleared report cache");
        Ok(removed)
    }

    /// Where fresh computation must begin, or `None` when every complete
    /// bucket is already cached
    ///
    /// The cached tail is trusted only when it connects unbroken to the
    /// point where fresh computation starts: rows contiguous, ending at or
    /// before the newest complete bucket, with cached + missing spanning
    /// exactly `limit` buckets.
    fn recompute_start(
        grouping: Grouping,
        cached: &[CachedBucket],
        first_wanted: ReportingPeriod,
        closed_end: ReportingPeriod,
        limit: usize,
    ) -> Option<ReportingPeriod> {
        if cached.is_empty() {
            return Some(first_wanted);
        }
        let periods: Vec<ReportingPeriod> = cached
            .iter()
            .map(|row| ReportingPeriod::new(grouping, row.bucket_instant))
            .collect();
        let contiguous = periods.windows(2).all(|pair| pair[0].next() == pair[1]);
        if !contiguous {
            debug!("cached rows are not contiguous; recomputing the whole range");
            return Some(first_wanted);
        }
        let last_cached = *periods.last().expect("cached is non-empty");
        if last_cached.start() > closed_end.start() {
            return Some(first_wanted);
        }
        let missing = last_cached.distance_to(&closed_end) as usize;
        if periods.len() + missing == limit {
            if missing == 0 {
                None
            } else {
                debug!(
                    cached = periods.len(),
                    missing, "incremental backfill after cached tail"
                );
                Some(last_cached.next())
            }
        } else {
            debug!(
                cached = periods.len(),
                missing, limit, "cached tail does not span the window; recomputing"
            );
            Some(first_wanted)
        }
    }

    /// Parse executor bucket keys into normalized bucket start instants
    fn parse_bucket_values(
        &self,
        grouping: Grouping,
        raw: Vec<BucketValue>,
    ) -> Result<HashMap<DateTime<Utc>, f64>> {
        let mut out = HashMap::with_capacity(raw.len());
        for BucketValue { bucket_key, value } in raw {
            let instant = self.dialect.parse_bucket_key(grouping, &bucket_key)?;
            out.insert(ReportingPeriod::new(grouping, instant).start(), value);
        }
        Ok(out)
    }
}

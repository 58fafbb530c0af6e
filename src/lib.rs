//! Trendline - Incremental time-bucketed aggregate reporting
//!
//! This library provides cached aggregate reporting over a record store
//! (e.g. "registrations per day") with:
//! - Calendar-aligned reporting periods (hour/day/week/month, weeks start
//!   Monday)
//! - A per-bucket cache that backfills only the buckets missing from it
//! - At most one aggregation query against the record store per report run
//! - Live values for the still-open current bucket, freshly computed and
//!   never cached
//! - Running-total cumulation seeded by the history outside the window
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trendline::dialect::MemoryDialect;
//! use trendline::engine::ReportCache;
//! use trendline::executor::MemoryRecordStore;
//! use trendline::report::{Report, RunOptions};
//! use trendline::store::MemoryCacheStore;
//!
//! let engine = ReportCache::new(
//!     Arc::new(MemoryCacheStore::new()),
//!     Arc::new(MemoryDialect),
//! );
//! let records = Arc::new(MemoryRecordStore::new());
//! records.insert_at(chrono::Utc::now());
//!
//! let report = Report::builder("users", "registrations")
//!     .limit(14)
//!     .engine(engine)
//!     .executor(records)
//!     .build()
//!     .unwrap();
//!
//! let series = report.run(RunOptions::new().live_data(true)).unwrap();
//! assert_eq!(series.len(), 15);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod period;
pub mod registry;
pub mod report;
pub mod store;
pub mod types;

// Re-export main types
pub use config::Config;
pub use engine::ReportCache;
pub use error::{Error, Result};
pub use period::ReportingPeriod;
pub use report::{CumulatedReport, Report, ReportBuilder, ReportOptions, RunOptions};
pub use types::{AggregationKind, Conditions, Grouping, QueryIdentity, ResultSeries};

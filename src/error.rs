//! Error types for the reporting cache

use thiserror::Error;

/// Main error type for the reporting cache
#[derive(Error, Debug)]
pub enum Error {
    /// Query or report definition validation error
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Reporting period error
    #[error("Period error: {0}")]
    Period(#[from] PeriodError),

    /// Aggregation executor error
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Cache store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Dialect adapter error
    #[error("Dialect error: {0}")]
    Dialect(#[from] DialectError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Validation errors
///
/// All validation is performed synchronously before any store access, so a
/// query that fails validation never touches the cache.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Unknown grouping identifier
    #[error("Invalid grouping: {0}")]
    InvalidGrouping(String),

    /// Unknown aggregation identifier
    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    /// Inconsistent or malformed report options
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// End date in the future, or combined with live data
    #[error("Invalid end date: {0}")]
    InvalidEndDate(String),

    /// Limit must be positive
    #[error("Invalid limit: {0} (limit must be positive)")]
    InvalidLimit(usize),
}

/// Reporting period errors
#[derive(Error, Debug)]
pub enum PeriodError {
    /// Periods of different groupings have no defined order
    #[error("Cannot compare reporting periods with groupings '{left}' and '{right}'")]
    IncomparablePeriods {
        /// Grouping identifier of the left-hand period
        left: String,
        /// Grouping identifier of the right-hand period
        right: String,
    },
}

/// Aggregation executor errors
///
/// Executor failures are propagated, never swallowed: an aggregation failure
/// aborts the whole cache transaction so no partial values are persisted.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The underlying aggregation query failed
    #[error("Aggregation failed: {0}")]
    Failed(String),

    /// A value column is required for this aggregation kind
    #[error("Aggregation '{0}' requires a value column")]
    MissingValueColumn(String),
}

/// Cache store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Concurrent insert of the same bucket row
    ///
    /// The uniqueness invariant makes the losing insert a no-op, so the
    /// engine swallows this instead of failing the query.
    #[error("Conflicting write for bucket at {bucket_instant}")]
    WriteConflict {
        /// Start instant of the bucket both writers computed
        bucket_instant: String,
    },

    /// The store backend failed
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Dialect adapter errors
#[derive(Error, Debug)]
pub enum DialectError {
    /// A bucket key returned by the executor could not be parsed back
    #[error("Cannot parse bucket key '{key}' for grouping '{grouping}'")]
    UnparsableBucketKey {
        /// The store-native bucket key string
        key: String,
        /// Grouping identifier the key was parsed for
        grouping: String,
    },

    /// Unknown dialect identifier in configuration
    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

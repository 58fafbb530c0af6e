//! Dialect adapters: store-specific bucketing expressions and key parsing
//!
//! A [`DialectAdapter`] translates a grouping into the bucketing expression
//! the record store groups by, and parses the store-native bucket key
//! strings back into instants. The only contract between the two sides is
//! that `parse_bucket_key` must invert whatever `bucketing_expression`
//! groups by.
//!
//! Adapters are selected by configuration (see [`crate::config`]), never by
//! inspecting a live database connection.

pub(crate) mod memory;
mod postgres;
mod sqlite;

pub use memory::MemoryDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::DialectError;
use crate::types::Grouping;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;

/// Store-specific bucketing expression generation and bucket key parsing
pub trait DialectAdapter: Send + Sync {
    /// Unique identifier for this dialect
    fn dialect_id(&self) -> &str;

    /// The expression the record store should group by for `grouping`
    ///
    /// The returned string is opaque to the engine; it is handed to the
    /// aggregation executor unchanged.
    fn bucketing_expression(&self, grouping: Grouping, date_column: &str) -> String;

    /// Parse a store-native bucket key back into an instant
    ///
    /// The instant need not be bucket-aligned; the engine normalizes it into
    /// a reporting period.
    fn parse_bucket_key(
        &self,
        grouping: Grouping,
        key: &str,
    ) -> Result<DateTime<Utc>, DialectError>;
}

/// Construct the dialect named by a configuration identifier
///
/// # Errors
///
/// Returns [`DialectError::UnknownDialect`] for identifiers other than
/// `memory`, `postgres` or `sqlite`.
pub fn from_identifier(identifier: &str) -> Result<Arc<dyn DialectAdapter>, DialectError> {
    match identifier {
        "memory" => Ok(Arc::new(MemoryDialect)),
        "postgres" => Ok(Arc::new(PostgresDialect)),
        "sqlite" => Ok(Arc::new(SqliteDialect)),
        other => Err(DialectError::UnknownDialect(other.to_string())),
    }
}

/// Try a list of datetime formats, then date-only formats at midnight
fn parse_with_formats(
    grouping: Grouping,
    key: &str,
    datetime_formats: &[&str],
    date_formats: &[&str],
) -> Result<DateTime<Utc>, DialectError> {
    for format in datetime_formats {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(key, format) {
            return Ok(parsed.and_utc());
        }
    }
    for format in date_formats {
        if let Ok(parsed) = NaiveDate::parse_from_str(key, format) {
            let midnight = parsed
                .and_hms_opt(0, 0, 0)
                .expect("midnight is in range");
            return Ok(midnight.and_utc());
        }
    }
    Err(DialectError::UnparsableBucketKey {
        key: key.to_string(),
        grouping: grouping.identifier().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_by_identifier() {
        assert_eq!(from_identifier("memory").unwrap().dialect_id(), "memory");
        assert_eq!(from_identifier("postgres").unwrap().dialect_id(), "postgres");
        assert_eq!(from_identifier("sqlite").unwrap().dialect_id(), "sqlite");
        assert!(matches!(
            from_identifier("oracle"),
            Err(DialectError::UnknownDialect(_))
        ));
    }
}

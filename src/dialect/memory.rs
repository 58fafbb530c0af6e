//! Dialect for the in-memory record store

use super::{parse_with_formats, DialectAdapter};
use crate::error::DialectError;
use crate::types::Grouping;
use chrono::{DateTime, Utc};

/// Canonical key format emitted by the in-memory executor
pub(crate) const KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Dialect for [`crate::executor::MemoryRecordStore`]
///
/// Expressions take the form `bucket(<grouping>,<date column>)` and keys are
/// full `YYYY-MM-DD HH:MM:SS` bucket start instants for every grouping.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryDialect;

impl DialectAdapter for MemoryDialect {
    fn dialect_id(&self) -> &str {
        "memory"
    }

    fn bucketing_expression(&self, grouping: Grouping, date_column: &str) -> String {
        format!("bucket({},{})", grouping.identifier(), date_column)
    }

    fn parse_bucket_key(
        &self,
        grouping: Grouping,
        key: &str,
    ) -> Result<DateTime<Utc>, DialectError> {
        parse_with_formats(grouping, key, &[KEY_FORMAT], &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expression_encodes_grouping_and_column() {
        let dialect = MemoryDialect;
        assert_eq!(
            dialect.bucketing_expression(Grouping::Week, "created_at"),
            "bucket(week,created_at)"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let dialect = MemoryDialect;
        let instant = dialect
            .parse_bucket_key(Grouping::Hour, "2024-03-04 15:00:00")
            .unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let dialect = MemoryDialect;
        assert!(matches!(
            dialect.parse_bucket_key(Grouping::Day, "yesterday"),
            Err(DialectError::UnparsableBucketKey { .. })
        ));
    }
}

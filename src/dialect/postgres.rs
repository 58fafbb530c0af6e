//! PostgreSQL dialect

use super::{parse_with_formats, DialectAdapter};
use crate::error::DialectError;
use crate::types::Grouping;
use chrono::{DateTime, Utc};

/// Bucketing via `date_trunc`
///
/// PostgreSQL truncates weeks to Monday, which matches the crate's week
/// alignment. Keys are text-cast timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl DialectAdapter for PostgresDialect {
    fn dialect_id(&self) -> &str {
        "postgres"
    }

    fn bucketing_expression(&self, grouping: Grouping, date_column: &str) -> String {
        format!("date_trunc('{}', {})", grouping.identifier(), date_column)
    }

    fn parse_bucket_key(
        &self,
        grouping: Grouping,
        key: &str,
    ) -> Result<DateTime<Utc>, DialectError> {
        parse_with_formats(
            grouping,
            key,
            &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"],
            &["%Y-%m-%d"],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expressions() {
        let dialect = PostgresDialect;
        assert_eq!(
            dialect.bucketing_expression(Grouping::Day, "created_at"),
            "date_trunc('day', created_at)"
        );
        assert_eq!(
            dialect.bucketing_expression(Grouping::Month, "paid_at"),
            "date_trunc('month', paid_at)"
        );
    }

    #[test]
    fn test_parses_timestamp_and_fractional_keys() {
        let dialect = PostgresDialect;
        let expected = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        assert_eq!(
            dialect
                .parse_bucket_key(Grouping::Day, "2024-03-04 00:00:00")
                .unwrap(),
            expected
        );
        assert_eq!(
            dialect
                .parse_bucket_key(Grouping::Day, "2024-03-04 00:00:00.000000")
                .unwrap(),
            expected
        );
    }
}

//! SQLite dialect

use super::{parse_with_formats, DialectAdapter};
use crate::error::DialectError;
use crate::types::Grouping;
use chrono::{DateTime, Utc};

/// Bucketing via `strftime`/`date` modifiers
///
/// SQLite has no native week truncation; `'weekday 0', '-6 days'` advances
/// to the enclosing week's Sunday and steps back to its Monday.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl DialectAdapter for SqliteDialect {
    fn dialect_id(&self) -> &str {
        "sqlite"
    }

    fn bucketing_expression(&self, grouping: Grouping, date_column: &str) -> String {
        match grouping {
            Grouping::Hour => format!("strftime('%Y-%m-%d %H:00:00', {date_column})"),
            Grouping::Day => format!("strftime('%Y-%m-%d', {date_column})"),
            Grouping::Week => format!("date({date_column}, 'weekday 0', '-6 days')"),
            Grouping::Month => format!("strftime('%Y-%m-01', {date_column})"),
        }
    }

    fn parse_bucket_key(
        &self,
        grouping: Grouping,
        key: &str,
    ) -> Result<DateTime<Utc>, DialectError> {
        match grouping {
            Grouping::Hour => parse_with_formats(grouping, key, &["%Y-%m-%d %H:%M:%S"], &[]),
            Grouping::Day | Grouping::Week | Grouping::Month => {
                parse_with_formats(grouping, key, &[], &["%Y-%m-%d"])
            }
        }
    }
}

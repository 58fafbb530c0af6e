//! In-memory record store and executor
//!
//! A fully functional [`AggregationExecutor`] over records held in memory.
//! Intended for unit and integration testing without an external database,
//! and for small single-process deployments. Understands the
//! `bucket(<grouping>,<column>)` expressions produced by
//! [`crate::dialect::MemoryDialect`].

use super::{AggregationExecutor, AggregationRequest, BucketValue};
use crate::dialect::memory::KEY_FORMAT;
use crate::error::ExecutorError;
use crate::period::ReportingPeriod;
use crate::types::{AggregationKind, Grouping};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// One record in the in-memory store
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    date: DateTime<Utc>,
    numbers: HashMap<String, f64>,
    attributes: HashMap<String, String>,
}

impl MemoryRecord {
    /// Create a record dated `date`
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date,
            numbers: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Attach a numeric column value
    pub fn with_number(mut self, column: &str, value: f64) -> Self {
        self.numbers.insert(column.to_string(), value);
        self
    }

    /// Attach a string attribute, matched by equality conditions
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    fn matches(&self, request: &AggregationRequest) -> bool {
        request
            .conditions
            .iter()
            .all(|(key, value)| self.attributes.get(key).map(String::as_str) == Some(value))
    }
}

/// In-memory record store implementing [`AggregationExecutor`]
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl MemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    pub fn insert(&self, record: MemoryRecord) {
        self.records.write().push(record);
    }

    /// Add a bare record dated `date` (enough for count reports)
    pub fn insert_at(&self, date: DateTime<Utc>) {
        self.insert(MemoryRecord::new(date));
    }

    /// Number of records in the store
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Numeric values of the matching records' value column
    ///
    /// Records without the column are skipped, like SQL NULLs.
    fn fold(
        kind: AggregationKind,
        value_column: Option<&str>,
        records: &[&MemoryRecord],
    ) -> Result<f64, ExecutorError> {
        if kind == AggregationKind::Count {
            return Ok(records.len() as f64);
        }
        let column = value_column.ok_or_else(|| {
            ExecutorError::MissingValueColumn(kind.identifier().to_string())
        })?;
        let values: Vec<f64> = records
            .iter()
            .filter_map(|record| record.numbers.get(column).copied())
            .collect();
        if values.is_empty() {
            return Ok(0.0);
        }
        let folded = match kind {
            AggregationKind::Count => unreachable!("count handled above"),
            AggregationKind::Sum => values.iter().sum(),
            AggregationKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregationKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregationKind::Avg => values.iter().sum::<f64>() / values.len() as f64,
        };
        Ok(folded)
    }
}

/// Parse a `bucket(<grouping>,<column>)` expression
fn parse_expression(expression: &str) -> Result<Grouping, ExecutorError> {
    let inner = expression
        .strip_prefix("bucket(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| {
            ExecutorError::Failed(format!("unsupported bucketing expression '{expression}'"))
        })?;
    let grouping_id = inner.split(',').next().unwrap_or_default();
    Grouping::from_identifier(grouping_id)
        .map_err(|_| ExecutorError::Failed(format!("unknown grouping in '{expression}'")))
}

impl AggregationExecutor for MemoryRecordStore {
    fn execute(
        &self,
        begin: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        request: &AggregationRequest,
    ) -> Result<Vec<BucketValue>, ExecutorError> {
        let grouping = parse_expression(&request.bucketing_expression)?;
        let records = self.records.read();

        let mut buckets: BTreeMap<DateTime<Utc>, Vec<&MemoryRecord>> = BTreeMap::new();
        for record in records.iter() {
            if record.date < begin {
                continue;
            }
            if let Some(end) = end {
                if record.date > end {
                    continue;
                }
            }
            if !record.matches(request) {
                continue;
            }
            let bucket = ReportingPeriod::new(grouping, record.date).start();
            buckets.entry(bucket).or_default().push(record);
        }

        let mut out = Vec::with_capacity(buckets.len());
        for (bucket, members) in &buckets {
            out.push(BucketValue {
                bucket_key: bucket.format(KEY_FORMAT).to_string(),
                value: Self::fold(request.aggregation, request.value_column.as_deref(), members)?,
            });
        }
        Ok(out)
    }

    fn execute_total(
        &self,
        before: DateTime<Utc>,
        request: &AggregationRequest,
    ) -> Result<f64, ExecutorError> {
        let records = self.records.read();
        let matching: Vec<&MemoryRecord> = records
            .iter()
            .filter(|record| record.date < before && record.matches(request))
            .collect();
        Self::fold(request.aggregation, request.value_column.as_deref(), &matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Conditions;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn count_request() -> AggregationRequest {
        AggregationRequest {
            aggregation: AggregationKind::Count,
            value_column: None,
            date_column: "created_at".to_string(),
            conditions: Conditions::new(),
            bucketing_expression: "bucket(day,created_at)".to_string(),
        }
    }

    #[test]
    fn test_count_per_day() {
        let store = MemoryRecordStore::new();
        store.insert_at(at(1, 9));
        store.insert_at(at(1, 17));
        store.insert_at(at(3, 12));

        let out = store.execute(at(1, 0), Some(at(4, 0)), &count_request()).unwrap();
        assert_eq!(
            out,
            vec![
                BucketValue {
                    bucket_key: "2024-03-01 00:00:00".to_string(),
                    value: 2.0
                },
                BucketValue {
                    bucket_key: "2024-03-03 00:00:00".to_string(),
                    value: 1.0
                },
            ]
        );
    }

    #[test]
    fn test_empty_buckets_are_omitted() {
        let store = MemoryRecordStore::new();
        store.insert_at(at(1, 9));
        let out = store.execute(at(1, 0), Some(at(9, 0)), &count_request()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_range_bounds_are_inclusive_and_open_ended() {
        let store = MemoryRecordStore::new();
        store.insert_at(at(1, 0));
        store.insert_at(at(2, 0));
        store.insert_at(at(5, 0));

        let bounded = store.execute(at(2, 0), Some(at(2, 0)), &count_request()).unwrap();
        assert_eq!(bounded.len(), 1);

        let open = store.execute(at(2, 0), None, &count_request()).unwrap();
        assert_eq!(open.len(), 2);
    }

    #[test]
    fn test_sum_and_avg_over_value_column() {
        let store = MemoryRecordStore::new();
        store.insert(MemoryRecord::new(at(1, 9)).with_number("amount", 10.0));
        store.insert(MemoryRecord::new(at(1, 10)).with_number("amount", 4.0));
        // A record without the column is skipped, not counted as zero
        store.insert_at(at(1, 11));

        let mut request = count_request();
        request.aggregation = AggregationKind::Sum;
        request.value_column = Some("amount".to_string());
        let out = store.execute(at(1, 0), Some(at(2, 0)), &request).unwrap();
        assert_eq!(out[0].value, 14.0);

        request.aggregation = AggregationKind::Avg;
        let out = store.execute(at(1, 0), Some(at(2, 0)), &request).unwrap();
        assert_eq!(out[0].value, 7.0);
    }

    #[test]
    fn test_min_max() {
        let store = MemoryRecordStore::new();
        store.insert(MemoryRecord::new(at(1, 9)).with_number("amount", 3.0));
        store.insert(MemoryRecord::new(at(1, 10)).with_number("amount", 8.0));

        let mut request = count_request();
        request.value_column = Some("amount".to_string());

        request.aggregation = AggregationKind::Min;
        assert_eq!(
            store.execute(at(1, 0), None, &request).unwrap()[0].value,
            3.0
        );
        request.aggregation = AggregationKind::Max;
        assert_eq!(
            store.execute(at(1, 0), None, &request).unwrap()[0].value,
            8.0
        );
    }

    #[test]
    fn test_conditions_filter_records() {
        let store = MemoryRecordStore::new();
        store.insert(MemoryRecord::new(at(1, 9)).with_attribute("source", "web"));
        store.insert(MemoryRecord::new(at(1, 10)).with_attribute("source", "api"));
        store.insert_at(at(1, 11));

        let mut request = count_request();
        request.conditions = Conditions::new().with("source", "web");
        let out = store.execute(at(1, 0), None, &request).unwrap();
        assert_eq!(out[0].value, 1.0);
    }

    #[test]
    fn test_total_is_strictly_before() {
        let store = MemoryRecordStore::new();
        store.insert_at(at(1, 0));
        store.insert_at(at(2, 0));
        store.insert_at(at(2, 5));

        let total = store.execute_total(at(2, 0), &count_request()).unwrap();
        assert_eq!(total, 1.0);
    }

    #[test]
    fn test_missing_value_column_is_an_error() {
        let store = MemoryRecordStore::new();
        store.insert_at(at(1, 0));
        let mut request = count_request();
        request.aggregation = AggregationKind::Sum;
        assert!(matches!(
            store.execute(at(1, 0), None, &request),
            Err(ExecutorError::MissingValueColumn(_))
        ));
    }

    #[test]
    fn test_unsupported_expression_fails() {
        let store = MemoryRecordStore::new();
        let mut request = count_request();
        request.bucketing_expression = "date_trunc('day', created_at)".to_string();
        assert!(matches!(
            store.execute(at(1, 0), None, &request),
            Err(ExecutorError::Failed(_))
        ));
    }
}

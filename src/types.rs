//! Core data types used throughout the reporting cache
//!
//! This module defines the fundamental data structures used across the system:
//!
//! # Key Types
//!
//! - **`Grouping`**: The bucket granularity of a report (hour/day/week/month)
//! - **`AggregationKind`**: How record values are folded into a bucket value
//! - **`Conditions`**: Filter conditions with an order-independent fingerprint
//! - **`QueryIdentity`**: The identity under which bucket values are cached
//! - **`ResultSeries`**: An ordered, gap-free series of (period, value) pairs
//!
//! # Example
//!
//! ```rust
//! use trendline::types::{AggregationKind, Conditions, Grouping};
//!
//! let grouping = Grouping::from_identifier("week").unwrap();
//! assert_eq!(grouping.identifier(), "week");
//!
//! // Unknown identifiers are a construction error
//! assert!(Grouping::from_identifier("decade").is_err());
//!
//! // Fingerprints are stable across insertion order
//! let a = Conditions::new().with("source", "web").with("plan", "pro");
//! let b = Conditions::new().with("plan", "pro").with("source", "web");
//! assert_eq!(a.fingerprint(), b.fingerprint());
//! ```

use crate::error::ValidationError;
use crate::period::ReportingPeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bucket granularity of a report
///
/// A closed enumeration: any identifier outside the four supported values is
/// a construction error. Weeks are aligned to Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// One clock hour
    Hour,
    /// One calendar day
    Day,
    /// One calendar week, starting Monday
    Week,
    /// One calendar month
    Month,
}

impl Grouping {
    /// Construct a grouping from its string identifier
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidGrouping`] for anything other than
    /// `hour`, `day`, `week` or `month`.
    pub fn from_identifier(identifier: &str) -> Result<Self, ValidationError> {
        match identifier {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(ValidationError::InvalidGrouping(other.to_string())),
        }
    }

    /// String identifier of this grouping
    pub fn identifier(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// How record values are folded into a single bucket value
///
/// A closed enumeration. Every kind except [`AggregationKind::Count`]
/// requires an explicit value column on the report definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    /// Number of records in the bucket
    Count,
    /// Sum of the value column
    Sum,
    /// Minimum of the value column
    Min,
    /// Maximum of the value column
    Max,
    /// Arithmetic mean of the value column
    Avg,
}

impl AggregationKind {
    /// Construct an aggregation kind from its string identifier
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAggregation`] for anything other
    /// than `count`, `sum`, `min`, `max` or `avg`.
    pub fn from_identifier(identifier: &str) -> Result<Self, ValidationError> {
        match identifier {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "avg" => Ok(Self::Avg),
            other => Err(ValidationError::InvalidAggregation(other.to_string())),
        }
    }

    /// String identifier of this aggregation kind
    pub fn identifier(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
        }
    }

    /// Whether this kind needs a value column to aggregate over
    pub fn requires_value_column(&self) -> bool {
        !matches!(self, Self::Count)
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Filter conditions applied to the record store before aggregation
///
/// Conditions are equality constraints on record attributes. Their
/// fingerprint is an order-independent serialization (keys are kept sorted),
/// so semantically identical conditions always map to the same cache row
/// identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions(BTreeMap<String, String>);

impl Conditions {
    /// Create an empty condition set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition, builder style
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Add an equality condition in place
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    /// Whether no conditions are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over (key, value) pairs in sorted key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Stable, order-independent serialization of the conditions
    ///
    /// Empty conditions fingerprint to the empty string. The fingerprint is
    /// part of the cached-bucket identity, so two queries with the same
    /// conditions share cache rows regardless of how the conditions were
    /// assembled.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

/// The identity under which bucket values are cached
///
/// The tuple (entity, report, grouping, aggregation, conditions fingerprint)
/// plus a bucket instant uniquely identifies one cached value. Two queries
/// with the same identity trust each other's cached buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryIdentity {
    /// Name of the reported-on collection (e.g. a table name)
    pub entity: String,
    /// Name of the report definition
    pub report: String,
    /// Bucket granularity
    pub grouping: Grouping,
    /// Aggregation kind
    pub aggregation: AggregationKind,
    /// Stable serialization of the filter conditions, empty if none
    pub conditions_fingerprint: String,
}

impl QueryIdentity {
    /// Create a query identity
    pub fn new(
        entity: &str,
        report: &str,
        grouping: Grouping,
        aggregation: AggregationKind,
        conditions: &Conditions,
    ) -> Self {
        Self {
            entity: entity.to_string(),
            report: report.to_string(),
            grouping,
            aggregation,
            conditions_fingerprint: conditions.fingerprint(),
        }
    }
}

/// One (period, value) pair in a result series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesEntry {
    /// The bucket this value belongs to
    pub period: ReportingPeriod,
    /// The aggregated value for the bucket
    pub value: f64,
}

impl SeriesEntry {
    /// Start instant of the bucket
    pub fn instant(&self) -> DateTime<Utc> {
        self.period.start()
    }
}

/// An ordered, gap-free series of bucket values, oldest first
///
/// Tagged with the entity and report identity for downstream labeling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSeries {
    /// Name of the reported-on collection
    pub entity: String,
    /// Name of the report definition
    pub report: String,
    entries: Vec<SeriesEntry>,
}

impl ResultSeries {
    /// Create a series from ordered entries
    pub fn new(entity: &str, report: &str, entries: Vec<SeriesEntry>) -> Self {
        Self {
            entity: entity.to_string(),
            report: report.to_string(),
            entries,
        }
    }

    /// The ordered entries, oldest first
    pub fn entries(&self) -> &[SeriesEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the series is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The bucket values in order, without their periods
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.value).collect()
    }

    /// Oldest entry
    pub fn first(&self) -> Option<&SeriesEntry> {
        self.entries.first()
    }

    /// Newest entry
    pub fn last(&self) -> Option<&SeriesEntry> {
        self.entries.last()
    }

    /// Sum of all values in the series
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.value).sum()
    }

    /// Iterate over the entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &SeriesEntry> {
        self.entries.iter()
    }

    /// Replace the entries, preserving the identity tags
    pub(crate) fn map_values(mut self, mut f: impl FnMut(&SeriesEntry) -> f64) -> Self {
        for entry in &mut self.entries {
            let value = f(&*entry);
            entry.value = value;
        }
        self
    }
}

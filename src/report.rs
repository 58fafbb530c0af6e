//! Named report definitions
//!
//! A [`Report`] binds a query identity (entity, report name, columns,
//! aggregation kind) to default options and to the engine and executor it
//! runs against. [`CumulatedReport`] wraps a report and post-processes its
//! series into a running total seeded by the history outside the visible
//! window.

use crate::engine::ReportCache;
use crate::error::{Error, Result, ValidationError};
use crate::executor::{AggregationExecutor, AggregationRequest};
use crate::types::{AggregationKind, Conditions, Grouping, QueryIdentity, ResultSeries};
use chrono::{DateTime, Utc};
use std::sync::Arc;

// ============================================================================
// Options
// ============================================================================

/// Fully resolved query options
///
/// What the engine consumes after call-time overrides have been merged over
/// a report's defaults.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Bucket granularity
    pub grouping: Grouping,
    /// Number of buckets in the result (the live bucket comes on top)
    pub limit: usize,
    /// Equality filters applied to the record store
    pub conditions: Conditions,
    /// Include a freshly computed value for the still-open current bucket
    pub live_data: bool,
    /// End the series at this instant's bucket instead of at "now"
    pub end_date: Option<DateTime<Utc>>,
    /// Whether results may be persisted in and served from the cache
    pub cacheable: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            grouping: Grouping::Day,
            limit: 100,
            conditions: Conditions::new(),
            live_data: false,
            end_date: None,
            cacheable: true,
        }
    }
}

/// Call-time option overrides
///
/// Unset fields fall back to the report's defaults. Supplying conditions
/// without an explicit `cacheable` choice turns caching off for the call,
/// since ad-hoc filters would otherwise explode the cache key space.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    grouping: Option<Grouping>,
    limit: Option<usize>,
    conditions: Option<Conditions>,
    live_data: Option<bool>,
    end_date: Option<DateTime<Utc>>,
    cacheable: Option<bool>,
}

impl RunOptions {
    /// No overrides; run with the report's defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the bucket granularity
    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = Some(grouping);
        self
    }

    /// Override the number of buckets
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filter the records before aggregation
    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Include the still-open current bucket
    pub fn live_data(mut self, live_data: bool) -> Self {
        self.live_data = Some(live_data);
        self
    }

    /// End the series at this instant's bucket
    pub fn end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Force caching on or off for this call
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }
}

// ============================================================================
// Report
// ============================================================================

/// A named aggregate query over one entity
pub struct Report {
    entity: String,
    name: String,
    date_column: String,
    value_column: Option<String>,
    aggregation: AggregationKind,
    defaults: ReportOptions,
    engine: ReportCache,
    executor: Arc<dyn AggregationExecutor>,
}

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Report")
            .field("entity", &self.entity)
            .field("name", &self.name)
            .field("date_column", &self.date_column)
            .field("value_column", &self.value_column)
            .field("aggregation", &self.aggregation)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Report {
    /// Start building a report for `entity` named `name`
    pub fn builder(entity: &str, name: &str) -> ReportBuilder {
        ReportBuilder::new(entity, name)
    }

    /// Name of the reported-on collection
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Name of the report
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The report's default options
    pub fn defaults(&self) -> &ReportOptions {
        &self.defaults
    }

    /// Run the report with call-time overrides merged over the defaults
    pub fn run(&self, options: RunOptions) -> Result<ResultSeries> {
        self.run_at(Utc::now(), options)
    }

    /// [`Report::run`] with an explicit "now", for deterministic tests
    pub fn run_at(&self, now: DateTime<Utc>, options: RunOptions) -> Result<ResultSeries> {
        let merged = self.merged_options(&options);
        let identity = QueryIdentity::new(
            &self.entity,
            &self.name,
            merged.grouping,
            self.aggregation,
            &merged.conditions,
        );
        let request = self.request(&merged);
        let executor = Arc::clone(&self.executor);
        self.engine.process_at(now, &identity, &merged, move |begin, end| {
            executor.execute(begin, end, &request)
        })
    }

    /// Drop every cached row for this report
    pub fn clear_cache(&self) -> Result<u64> {
        self.engine.clear(&self.entity, &self.name)
    }

    fn merged_options(&self, run: &RunOptions) -> ReportOptions {
        let conditions = run
            .conditions
            .clone()
            .unwrap_or_else(|| self.defaults.conditions.clone());
        let cacheable = match run.cacheable {
            Some(explicit) => explicit,
            // Ad-hoc filtered queries are always-fresh unless forced
            None if !conditions.is_empty() => false,
            None => self.defaults.cacheable,
        };
        ReportOptions {
            grouping: run.grouping.unwrap_or(self.defaults.grouping),
            limit: run.limit.unwrap_or(self.defaults.limit),
            conditions,
            live_data: run.live_data.unwrap_or(self.defaults.live_data),
            end_date: run.end_date.or(self.defaults.end_date),
            cacheable,
        }
    }

    fn request(&self, options: &ReportOptions) -> AggregationRequest {
        AggregationRequest {
            aggregation: self.aggregation,
            value_column: self.value_column.clone(),
            date_column: self.date_column.clone(),
            conditions: options.conditions.clone(),
            bucketing_expression: self
                .engine
                .dialect()
                .bucketing_expression(options.grouping, &self.date_column),
        }
    }
}

/// Builder for [`Report`]
pub struct ReportBuilder {
    entity: String,
    name: String,
    date_column: String,
    value_column: Option<String>,
    aggregation: AggregationKind,
    defaults: ReportOptions,
    cacheable: Option<bool>,
    engine: Option<ReportCache>,
    executor: Option<Arc<dyn AggregationExecutor>>,
}

impl ReportBuilder {
    /// Create a builder with the default column and option set
    pub fn new(entity: &str, name: &str) -> Self {
        Self {
            entity: entity.to_string(),
            name: name.to_string(),
            date_column: "created_at".to_string(),
            value_column: None,
            aggregation: AggregationKind::Count,
            defaults: ReportOptions::default(),
            cacheable: None,
            engine: None,
            executor: None,
        }
    }

    /// Column holding each record's instant (default `created_at`)
    pub fn date_column(mut self, column: &str) -> Self {
        self.date_column = column.to_string();
        self
    }

    /// Column aggregated over; required for every kind except count
    pub fn value_column(mut self, column: &str) -> Self {
        self.value_column = Some(column.to_string());
        self
    }

    /// Aggregation kind (default count)
    pub fn aggregation(mut self, aggregation: AggregationKind) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Default bucket granularity (default day)
    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.defaults.grouping = grouping;
        self
    }

    /// Default number of buckets (default 100)
    pub fn limit(mut self, limit: usize) -> Self {
        self.defaults.limit = limit;
        self
    }

    /// Default conditions applied on every run
    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.defaults.conditions = conditions;
        self
    }

    /// Default live-data inclusion (default off)
    pub fn live_data(mut self, live_data: bool) -> Self {
        self.defaults.live_data = live_data;
        self
    }

    /// Default cacheability; unset, it is true for unconditioned reports
    /// and false once default conditions are supplied
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }

    /// The engine to run against
    pub fn engine(mut self, engine: ReportCache) -> Self {
        self.engine = Some(engine);
        self
    }

    /// The aggregation executor to compute fresh buckets with
    pub fn executor(mut self, executor: Arc<dyn AggregationExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validate and build the report
    pub fn build(mut self) -> Result<Report> {
        if self.aggregation.requires_value_column() && self.value_column.is_none() {
            return Err(ValidationError::InvalidOptions(format!(
                "aggregation '{}' requires a value column",
                self.aggregation
            ))
            .into());
        }
        if self.defaults.limit == 0 {
            return Err(ValidationError::InvalidLimit(0).into());
        }
        self.defaults.cacheable = match self.cacheable {
            Some(explicit) => explicit,
            None => self.defaults.conditions.is_empty(),
        };
        let engine = self
            .engine
            .ok_or_else(|| Error::Configuration("report has no engine".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| Error::Configuration("report has no executor".to_string()))?;
        Ok(Report {
            entity: self.entity,
            name: self.name,
            date_column: self.date_column,
            value_column: self.value_column,
            aggregation: self.aggregation,
            defaults: self.defaults,
            engine,
            executor,
        })
    }
}

// ============================================================================
// CumulatedReport
// ============================================================================

/// A report whose series is transformed into a running total
///
/// The accumulator is seeded with the aggregate of all records strictly
/// before the first visible bucket, then walks the series oldest to newest.
/// Cumulation is forward, seeded by history outside the window, not a
/// reverse suffix sum.
pub struct CumulatedReport {
    report: Report,
}

impl CumulatedReport {
    /// Wrap a report
    pub fn new(report: Report) -> Self {
        Self { report }
    }

    /// The underlying report
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Run and cumulate
    pub fn run(&self, options: RunOptions) -> Result<ResultSeries> {
        self.run_at(Utc::now(), options)
    }

    /// [`CumulatedReport::run`] with an explicit "now"
    pub fn run_at(&self, now: DateTime<Utc>, options: RunOptions) -> Result<ResultSeries> {
        let merged = self.report.merged_options(&options);
        let series = self.report.run_at(now, options)?;
        let first_start = match series.first() {
            Some(entry) => entry.period.start(),
            None => return Ok(series),
        };
        let request = self.report.request(&merged);
        let seed = self.report.executor.execute_total(first_start, &request)?;
        let mut accumulator = seed;
        Ok(series.map_values(|entry| {
            accumulator += entry.value;
            accumulator
        }))
    }
}

/// A report that can be run by name, plain or cumulated
///
/// The registry stores reports behind this trait so both kinds live in the
/// same map.
pub trait RunnableReport: Send + Sync {
    /// Name of the reported-on collection
    fn entity(&self) -> &str;

    /// Name of the report
    fn name(&self) -> &str;

    /// Run with call-time overrides
    fn run(&self, options: RunOptions) -> Result<ResultSeries>;

    /// Run with an explicit "now"
    fn run_at(&self, now: DateTime<Utc>, options: RunOptions) -> Result<ResultSeries>;
}

impl RunnableReport for Report {
    fn entity(&self) -> &str {
        self.entity()
    }

    fn name(&self) -> &str {
        self.name()
    }

    fn run(&self, options: RunOptions) -> Result<ResultSeries> {
        Report::run(self, options)
    }

    fn run_at(&self, now: DateTime<Utc>, options: RunOptions) -> Result<ResultSeries> {
        Report::run_at(self, now, options)
    }
}

impl RunnableReport for CumulatedReport {
    fn entity(&self) -> &str {
        self.report.entity()
    }

    fn name(&self) -> &str {
        self.report.name()
    }

    fn run(&self, options: RunOptions) -> Result<ResultSeries> {
        CumulatedReport::run(self, options)
    }

    fn run_at(&self, now: DateTime<Utc>, options: RunOptions) -> Result<ResultSeries> {
        CumulatedReport::run_at(self, now, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MemoryDialect;
    use crate::executor::{MemoryRecord, MemoryRecordStore};
    use crate::store::MemoryCacheStore;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn setup() -> (ReportCache, Arc<MemoryRecordStore>, Arc<MemoryCacheStore>) {
        let cache = Arc::new(MemoryCacheStore::new());
        let records = Arc::new(MemoryRecordStore::new());
        let engine = ReportCache::new(cache.clone(), Arc::new(MemoryDialect));
        (engine, records, cache)
    }

    fn count_report(engine: ReportCache, records: Arc<MemoryRecordStore>) -> Report {
        Report::builder("users", "registrations")
            .engine(engine)
            .executor(records)
            .limit(5)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let (engine, records, _) = setup();
        let report = Report::builder("users", "registrations")
            .engine(engine)
            .executor(records)
            .build()
            .unwrap();
        assert_eq!(report.defaults().limit, 100);
        assert_eq!(report.defaults().grouping, Grouping::Day);
        assert!(!report.defaults().live_data);
        assert!(report.defaults().cacheable);
    }

    #[test]
    fn test_builder_rejects_sum_without_value_column() {
        let (engine, records, _) = setup();
        let err = Report::builder("invoices", "revenue")
            .aggregation(AggregationKind::Sum)
            .engine(engine)
            .executor(records)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_default_conditions_disable_caching() {
        let (engine, records, _) = setup();
        let report = Report::builder("users", "web_registrations")
            .conditions(Conditions::new().with("source", "web"))
            .engine(engine)
            .executor(records)
            .build()
            .unwrap();
        assert!(!report.defaults().cacheable);
    }

    #[test]
    fn test_run_counts_per_day() {
        let (engine, records, cache) = setup();
        let now = at(10, 12);
        records.insert_at(at(6, 9));
        records.insert_at(at(6, 15));
        records.insert_at(at(8, 1));

        let report = count_report(engine, records);
        let series = report.run_at(now, RunOptions::new()).unwrap();

        assert_eq!(series.entity, "users");
        assert_eq!(series.report, "registrations");
        // [Mar 5 .. Mar 9]
        assert_eq!(series.values(), vec![0.0, 2.0, 0.0, 1.0, 0.0]);
        assert_eq!(cache.row_count(), 5);
    }

    #[test]
    fn test_call_time_conditions_skip_the_cache() {
        let (engine, records, cache) = setup();
        let now = at(10, 12);
        records.insert(MemoryRecord::new(at(6, 9)).with_attribute("source", "web"));
        records.insert(MemoryRecord::new(at(6, 10)).with_attribute("source", "api"));

        let report = count_report(engine, records);
        let series = report
            .run_at(
                now,
                RunOptions::new().conditions(Conditions::new().with("source", "web")),
            )
            .unwrap();

        assert_eq!(series.values(), vec![0.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(cache.row_count(), 0);
    }

    #[test]
    fn test_conditions_can_be_cached_when_forced() {
        let (engine, records, cache) = setup();
        let now = at(10, 12);
        records.insert(MemoryRecord::new(at(6, 9)).with_attribute("source", "web"));

        let report = count_report(engine, records);
        let options = RunOptions::new()
            .conditions(Conditions::new().with("source", "web"))
            .cacheable(true);
        report.run_at(now, options.clone()).unwrap();
        assert_eq!(cache.row_count(), 5);

        // The unconditioned report keeps its own rows
        report.run_at(now, RunOptions::new()).unwrap();
        assert_eq!(cache.row_count(), 10);
    }

    #[test]
    fn test_sum_over_value_column() {
        let (engine, records, _) = setup();
        let now = at(10, 12);
        records.insert(MemoryRecord::new(at(7, 9)).with_number("amount", 12.5));
        records.insert(MemoryRecord::new(at(7, 10)).with_number("amount", 7.5));

        let report = Report::builder("invoices", "revenue")
            .aggregation(AggregationKind::Sum)
            .value_column("amount")
            .date_column("paid_at")
            .limit(4)
            .engine(engine)
            .executor(records)
            .build()
            .unwrap();

        let series = report.run_at(now, RunOptions::new()).unwrap();
        assert_eq!(series.values(), vec![0.0, 20.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cumulated_run_seeds_from_history() {
        let (engine, records, _) = setup();
        let now = at(10, 12);
        // 5 records before the window, then [1, 0, 2] across [Mar 7, 8, 9]
        for h in 0..5 {
            records.insert_at(at(1, h));
        }
        records.insert_at(at(7, 9));
        records.insert_at(at(9, 9));
        records.insert_at(at(9, 15));

        let report = Report::builder("users", "total_registrations")
            .limit(3)
            .engine(engine)
            .executor(records)
            .build()
            .unwrap();
        let cumulated = CumulatedReport::new(report);

        let series = cumulated.run_at(now, RunOptions::new()).unwrap();
        assert_eq!(series.values(), vec![6.0, 6.0, 8.0]);
    }

    #[test]
    fn test_cumulated_series_is_monotonic_for_counts() {
        let (engine, records, _) = setup();
        let now = at(10, 12);
        for d in 2..10 {
            records.insert_at(at(d, 12));
        }
        let cumulated = CumulatedReport::new(count_report(engine, records));
        let series = cumulated.run_at(now, RunOptions::new()).unwrap();
        let values = series.values();
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_run_options_override_defaults() {
        let (engine, records, _) = setup();
        let now = at(10, 12);
        let report = count_report(engine, records);

        let series = report
            .run_at(now, RunOptions::new().limit(2).grouping(Grouping::Hour))
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().instant(), at(10, 10));
    }

    #[test]
    fn test_clear_cache() {
        let (engine, records, cache) = setup();
        let now = at(10, 12);
        let report = count_report(engine, records);
        report.run_at(now, RunOptions::new()).unwrap();
        assert_eq!(cache.row_count(), 5);

        let removed = report.clear_cache().unwrap();
        assert_eq!(removed, 5);
        assert_eq!(cache.row_count(), 0);
    }
}

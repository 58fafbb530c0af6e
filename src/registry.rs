//! Static report registry
//!
//! Reports are attached to their entity by explicit registration in a map
//! from (entity, report name) to a built report instance. A process-wide
//! registry is available as [`global`].

use crate::error::{Error, Result};
use crate::report::{RunOptions, RunnableReport};
use crate::types::ResultSeries;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL: ReportRegistry = ReportRegistry::new();
}

/// The process-wide registry
pub fn global() -> &'static ReportRegistry {
    &GLOBAL
}

/// A map from (entity, report name) to report instances
#[derive(Default)]
pub struct ReportRegistry {
    reports: RwLock<HashMap<(String, String), Arc<dyn RunnableReport>>>,
}

impl ReportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a report under its entity and name
    ///
    /// Re-registering the same (entity, name) replaces the previous
    /// instance.
    pub fn register(&self, report: Arc<dyn RunnableReport>) {
        let key = (report.entity().to_string(), report.name().to_string());
        self.reports.write().insert(key, report);
    }

    /// Look up a report
    pub fn get(&self, entity: &str, name: &str) -> Option<Arc<dyn RunnableReport>> {
        self.reports
            .read()
            .get(&(entity.to_string(), name.to_string()))
            .cloned()
    }

    /// Remove a report, returning whether one was registered
    pub fn unregister(&self, entity: &str, name: &str) -> bool {
        self.reports
            .write()
            .remove(&(entity.to_string(), name.to_string()))
            .is_some()
    }

    /// Run a registered report by name
    pub fn run(&self, entity: &str, name: &str, options: RunOptions) -> Result<ResultSeries> {
        self.get(entity, name)
            .ok_or_else(|| {
                Error::Configuration(format!("no report '{name}' registered for '{entity}'"))
            })?
            .run(options)
    }

    /// [`ReportRegistry::run`] with an explicit "now"
    pub fn run_at(
        &self,
        now: DateTime<Utc>,
        entity: &str,
        name: &str,
        options: RunOptions,
    ) -> Result<ResultSeries> {
        self.get(entity, name)
            .ok_or_else(|| {
                Error::Configuration(format!("no report '{name}' registered for '{entity}'"))
            })?
            .run_at(now, options)
    }

    /// Names of the reports registered for an entity, sorted
    pub fn names_for(&self, entity: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .reports
            .read()
            .keys()
            .filter(|(e, _)| e == entity)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MemoryDialect;
    use crate::engine::ReportCache;
    use crate::executor::MemoryRecordStore;
    use crate::report::Report;
    use crate::store::MemoryCacheStore;
    use chrono::TimeZone;

    fn sample_report(name: &str) -> Arc<dyn RunnableReport> {
        let engine = ReportCache::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MemoryDialect),
        );
        Arc::new(
            Report::builder("users", name)
                .limit(3)
                .engine(engine)
                .executor(Arc::new(MemoryRecordStore::new()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_register_and_run() {
        let registry = ReportRegistry::new();
        registry.register(sample_report("registrations"));

        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let series = registry
            .run_at(now, "users", "registrations", RunOptions::new())
            .unwrap();
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_unknown_report_is_an_error() {
        let registry = ReportRegistry::new();
        assert!(registry
            .run("users", "missing", RunOptions::new())
            .is_err());
    }

    #[test]
    fn test_unregister() {
        let registry = ReportRegistry::new();
        registry.register(sample_report("registrations"));
        assert!(registry.unregister("users", "registrations"));
        assert!(!registry.unregister("users", "registrations"));
        assert!(registry.get("users", "registrations").is_none());
    }

    #[test]
    fn test_names_for_entity() {
        let registry = ReportRegistry::new();
        registry.register(sample_report("registrations"));
        registry.register(sample_report("cancellations"));
        assert_eq!(
            registry.names_for("users"),
            vec!["cancellations".to_string(), "registrations".to_string()]
        );
        assert!(registry.names_for("invoices").is_empty());
    }
}

//! Reporting periods: calendar-aligned time buckets
//!
//! A [`ReportingPeriod`] is one concrete bucket instance: a grouping plus the
//! calendar-aligned start instant of the bucket. Construction always floors
//! the given instant to the bucket start, so any instant within a bucket
//! yields the same period.
//!
//! All arithmetic is calendar arithmetic, not fixed-duration arithmetic:
//! offsetting a month period by 1 lands on the 1st of the following calendar
//! month regardless of how many days the month has. Weeks start Monday.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use trendline::period::ReportingPeriod;
//! use trendline::types::Grouping;
//!
//! // A Sunday normalizes to the Monday six days earlier
//! let sunday = Utc.with_ymd_and_hms(2024, 3, 3, 14, 30, 0).unwrap();
//! let period = ReportingPeriod::new(Grouping::Week, sunday);
//! assert_eq!(period.start(), Utc.with_ymd_and_hms(2024, 2, 26, 0, 0, 0).unwrap());
//!
//! // Offsetting is calendar arithmetic and always invertible
//! let later = period.offset(5);
//! assert_eq!(later.offset(-5), period);
//! ```

use crate::error::PeriodError;
use crate::types::Grouping;
use chrono::{DateTime, Datelike, Days, Duration, Months, Timelike, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// One concrete time bucket: a grouping and its aligned start instant
///
/// Periods are transient values; they are never persisted directly. Only the
/// derived cache rows carry bucket instants into storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReportingPeriod {
    grouping: Grouping,
    instant: DateTime<Utc>,
}

impl ReportingPeriod {
    /// Create the period containing `instant`
    ///
    /// The instant is floored to the bucket start, so this is idempotent:
    /// constructing a period from a period's own start yields the same
    /// period.
    pub fn new(grouping: Grouping, instant: DateTime<Utc>) -> Self {
        Self {
            grouping,
            instant: Self::normalize(grouping, instant),
        }
    }

    /// Floor an instant to the start of its bucket
    ///
    /// - `hour`: truncate minutes and below
    /// - `day`: truncate to midnight
    /// - `week`: move back to the most recent Monday (inclusive), midnight
    /// - `month`: the 1st of the month, midnight
    pub fn normalize(grouping: Grouping, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = instant.date_naive();
        let floored = match grouping {
            Grouping::Hour => date
                .and_hms_opt(instant.hour(), 0, 0)
                .expect("hour of an existing instant is in range"),
            Grouping::Day => date.and_hms_opt(0, 0, 0).expect("midnight is in range"),
            Grouping::Week => {
                let monday = date
                    .checked_sub_days(Days::new(u64::from(
                        date.weekday().num_days_from_monday(),
                    )))
                    .expect("weekday offset stays in range");
                monday.and_hms_opt(0, 0, 0).expect("midnight is in range")
            }
            Grouping::Month => date
                .with_day(1)
                .expect("every month has a day 1")
                .and_hms_opt(0, 0, 0)
                .expect("midnight is in range"),
        };
        floored.and_utc()
    }

    /// The bucket's grouping
    pub fn grouping(&self) -> Grouping {
        self.grouping
    }

    /// The aligned start instant of the bucket
    pub fn start(&self) -> DateTime<Utc> {
        self.instant
    }

    /// The period `amount` grouping-units away
    ///
    /// Calendar arithmetic in the grouping's unit. Month offsets move whole
    /// calendar months; the result is re-normalized, so it is always a valid
    /// bucket start.
    pub fn offset(&self, amount: i64) -> Self {
        let shifted = match self.grouping {
            Grouping::Hour => self.instant + Duration::hours(amount),
            Grouping::Day => self.instant + Duration::days(amount),
            Grouping::Week => self.instant + Duration::weeks(amount),
            Grouping::Month => {
                let months = Months::new(u32::try_from(amount.unsigned_abs()).expect(
                    "month offsets stay far below u32::MAX",
                ));
                let date = self.instant.date_naive();
                let shifted = if amount >= 0 {
                    date.checked_add_months(months)
                } else {
                    date.checked_sub_months(months)
                }
                .expect("month arithmetic stays in the supported year range");
                shifted
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is in range")
                    .and_utc()
            }
        };
        Self::new(self.grouping, shifted)
    }

    /// The period immediately after this one
    pub fn next(&self) -> Self {
        self.offset(1)
    }

    /// The period immediately before this one
    pub fn previous(&self) -> Self {
        self.offset(-1)
    }

    /// The earliest bucket a query with the given limit must include
    ///
    /// Defined as the period containing `end_date` (or `now` when unset),
    /// offset back by `limit` grouping-units.
    pub fn first(
        grouping: Grouping,
        limit: usize,
        end_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let anchor = end_date.unwrap_or(now);
        Self::new(grouping, anchor).offset(-(limit as i64))
    }

    /// The latest instant still inside the bucket
    ///
    /// E.g. 23:59:59 for a day bucket, or the last second of the last
    /// calendar day for a month bucket. Used to bound range queries against
    /// the aggregation executor.
    pub fn last_instant(&self) -> DateTime<Utc> {
        self.next().start() - Duration::seconds(1)
    }

    /// Whether an instant falls inside this bucket
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        Self::normalize(self.grouping, instant) == self.instant
    }

    /// Compare two periods, failing when their groupings differ
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::IncomparablePeriods`] when the groupings do
    /// not match. The `PartialOrd` impl expresses the same rule by returning
    /// `None`.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, PeriodError> {
        if self.grouping != other.grouping {
            return Err(PeriodError::IncomparablePeriods {
                left: self.grouping.identifier().to_string(),
                right: other.grouping.identifier().to_string(),
            });
        }
        Ok(self.instant.cmp(&other.instant))
    }

    /// Number of grouping-units from `self` forward to `other`
    ///
    /// Negative when `other` is earlier. Both periods must share a grouping;
    /// callers in this crate only compare periods they constructed with the
    /// same grouping.
    pub(crate) fn distance_to(&self, other: &Self) -> i64 {
        match self.grouping {
            Grouping::Hour => (other.instant - self.instant).num_hours(),
            Grouping::Day => (other.instant - self.instant).num_days(),
            Grouping::Week => (other.instant - self.instant).num_weeks(),
            Grouping::Month => {
                let a = self.instant.date_naive();
                let b = other.instant.date_naive();
                (i64::from(b.year()) - i64::from(a.year())) * 12
                    + (i64::from(b.month()) - i64::from(a.month()))
            }
        }
    }
}

impl PartialOrd for ReportingPeriod {
    /// `None` when the groupings differ; periods of different granularities
    /// have no defined order.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.grouping != other.grouping {
            return None;
        }
        Some(self.instant.cmp(&other.instant))
    }
}

/// A raw instant compares as the period containing it
impl PartialEq<DateTime<Utc>> for ReportingPeriod {
    fn eq(&self, other: &DateTime<Utc>) -> bool {
        self.instant == Self::normalize(self.grouping, *other)
    }
}

impl PartialOrd<DateTime<Utc>> for ReportingPeriod {
    fn partial_cmp(&self, other: &DateTime<Utc>) -> Option<Ordering> {
        Some(self.instant.cmp(&Self::normalize(self.grouping, *other)))
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.grouping,
            self.instant.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_hour_normalization() {
        let period = ReportingPeriod::new(Grouping::Hour, at(2024, 3, 4, 15, 42, 17));
        assert_eq!(period.start(), at(2024, 3, 4, 15, 0, 0));
    }

    #[test]
    fn test_day_normalization() {
        let period = ReportingPeriod::new(Grouping::Day, at(2024, 3, 4, 15, 42, 17));
        assert_eq!(period.start(), at(2024, 3, 4, 0, 0, 0));
    }

    #[test]
    fn test_week_normalization_moves_back_to_monday() {
        // 2024-03-07 is a Thursday; the week starts Monday 2024-03-04
        let period = ReportingPeriod::new(Grouping::Week, at(2024, 3, 7, 9, 0, 0));
        assert_eq!(period.start(), at(2024, 3, 4, 0, 0, 0));

        // A Monday is already aligned
        let monday = ReportingPeriod::new(Grouping::Week, at(2024, 3, 4, 0, 0, 0));
        assert_eq!(monday.start(), at(2024, 3, 4, 0, 0, 0));
    }

    #[test]
    fn test_week_normalization_sunday_crosses_month_and_year() {
        // Sunday 2024-03-03 normalizes to Monday 2024-02-26 (previous month)
        let period = ReportingPeriod::new(Grouping::Week, at(2024, 3, 3, 23, 59, 59));
        assert_eq!(period.start(), at(2024, 2, 26, 0, 0, 0));

        // Sunday 2023-01-01 normalizes to Monday 2022-12-26 (previous year)
        let period = ReportingPeriod::new(Grouping::Week, at(2023, 1, 1, 12, 0, 0));
        assert_eq!(period.start(), at(2022, 12, 26, 0, 0, 0));
    }

    #[test]
    fn test_month_normalization() {
        let period = ReportingPeriod::new(Grouping::Month, at(2024, 2, 29, 10, 0, 0));
        assert_eq!(period.start(), at(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for grouping in [Grouping::Hour, Grouping::Day, Grouping::Week, Grouping::Month] {
            let instant = at(2024, 3, 3, 14, 30, 45);
            let once = ReportingPeriod::normalize(grouping, instant);
            assert_eq!(ReportingPeriod::normalize(grouping, once), once);
        }
    }

    #[test]
    fn test_offset_roundtrip() {
        for grouping in [Grouping::Hour, Grouping::Day, Grouping::Week, Grouping::Month] {
            let period = ReportingPeriod::new(grouping, at(2024, 3, 3, 14, 30, 45));
            for n in [-25_i64, -1, 0, 1, 13, 40] {
                assert_eq!(period.offset(n).offset(-n), period, "grouping {grouping}, n {n}");
            }
        }
    }

    #[test]
    fn test_month_offset_is_calendar_arithmetic() {
        // January + 1 month = February, regardless of day counts
        let january = ReportingPeriod::new(Grouping::Month, at(2024, 1, 31, 8, 0, 0));
        assert_eq!(january.offset(1).start(), at(2024, 2, 1, 0, 0, 0));
        // December + 1 month crosses the year boundary
        let december = ReportingPeriod::new(Grouping::Month, at(2023, 12, 5, 0, 0, 0));
        assert_eq!(december.offset(1).start(), at(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_first_period() {
        let now = at(2024, 3, 10, 12, 0, 0);
        let first = ReportingPeriod::first(Grouping::Day, 10, None, now);
        assert_eq!(first.start(), at(2024, 2, 29, 0, 0, 0));

        let end = at(2024, 3, 5, 0, 0, 0);
        let first = ReportingPeriod::first(Grouping::Day, 3, Some(end), now);
        assert_eq!(first.start(), at(2024, 3, 2, 0, 0, 0));
    }

    #[test]
    fn test_last_instant() {
        let day = ReportingPeriod::new(Grouping::Day, at(2024, 3, 4, 9, 0, 0));
        assert_eq!(day.last_instant(), at(2024, 3, 4, 23, 59, 59));

        let month = ReportingPeriod::new(Grouping::Month, at(2024, 2, 10, 0, 0, 0));
        assert_eq!(month.last_instant(), at(2024, 2, 29, 23, 59, 59));
    }

    #[test]
    fn test_contains() {
        let week = ReportingPeriod::new(Grouping::Week, at(2024, 3, 4, 0, 0, 0));
        assert!(week.contains(at(2024, 3, 10, 23, 59, 59)));
        assert!(!week.contains(at(2024, 3, 11, 0, 0, 0)));
    }

    #[test]
    fn test_ordering_within_grouping() {
        let earlier = ReportingPeriod::new(Grouping::Day, at(2024, 3, 4, 0, 0, 0));
        let later = ReportingPeriod::new(Grouping::Day, at(2024, 3, 5, 0, 0, 0));
        assert!(earlier < later);
        assert_eq!(earlier.try_cmp(&later).unwrap(), Ordering::Less);

        // Equality requires equal grouping and equal normalized instant
        let same = ReportingPeriod::new(Grouping::Day, at(2024, 3, 4, 18, 30, 0));
        assert_eq!(earlier, same);
    }

    #[test]
    fn test_comparison_with_raw_instants_normalizes_first() {
        let week = ReportingPeriod::new(Grouping::Week, at(2024, 3, 4, 0, 0, 0));
        // Any instant inside the bucket compares equal
        assert_eq!(week, at(2024, 3, 10, 23, 59, 59));
        assert!(week < at(2024, 3, 11, 0, 0, 0));
        assert!(week > at(2024, 3, 3, 23, 59, 59));
    }

    #[test]
    fn test_cross_grouping_comparison_fails() {
        let day = ReportingPeriod::new(Grouping::Day, at(2024, 3, 4, 0, 0, 0));
        let week = ReportingPeriod::new(Grouping::Week, at(2024, 3, 4, 0, 0, 0));
        assert_eq!(day.partial_cmp(&week), None);
        assert!(matches!(
            day.try_cmp(&week),
            Err(PeriodError::IncomparablePeriods { .. })
        ));
    }

    #[test]
    fn test_distance_to() {
        let day = ReportingPeriod::new(Grouping::Day, at(2024, 3, 4, 0, 0, 0));
        assert_eq!(day.distance_to(&day.offset(7)), 7);
        assert_eq!(day.distance_to(&day.offset(-3)), -3);

        let month = ReportingPeriod::new(Grouping::Month, at(2023, 11, 1, 0, 0, 0));
        assert_eq!(month.distance_to(&month.offset(4)), 4);
    }
}

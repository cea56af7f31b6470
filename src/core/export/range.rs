//! Date range resolution
//!
//! A run covers an explicit `[start, end)` range, the full history
//! `[19990101, tomorrow)`, or the delta `[resume date, tomorrow)`. The end is
//! exclusive, so "tomorrow" includes today's partition.

use crate::domain::{DateRange, ExporterError, PartitionKey, Result};
use chrono::{Local, NaiveDate};
use std::fmt;

/// How the date range of a run is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Caller-supplied range
    Explicit(DateRange),
    /// Replay everything since the beginning of history
    Historical,
    /// Continue from the ledger's resume date
    Delta,
}

impl RunMode {
    /// Builds the mode from the command-line date flags
    ///
    /// Explicit dates take precedence over `historical`; the caller decides
    /// whether to warn about the ignored flag.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when only one of the dates is given, a
    /// date is not `YYYYMMDD`, or start is not before end.
    pub fn from_args(start: Option<&str>, end: Option<&str>, historical: bool) -> Result<Self> {
        match (start, end) {
            (Some(start), Some(end)) => {
                let start = parse_flag("--export_start_date", start)?;
                let end = parse_flag("--export_end_date", end)?;
                let range = DateRange::new(start, end).map_err(ExporterError::Configuration)?;
                Ok(RunMode::Explicit(range))
            }
            (Some(_), None) | (None, Some(_)) => Err(ExporterError::Configuration(
                "--export_start_date and --export_end_date must be supplied together".to_string(),
            )),
            (None, None) if historical => Ok(RunMode::Historical),
            (None, None) => Ok(RunMode::Delta),
        }
    }

    /// The range to process
    ///
    /// A resume date at or past tomorrow yields the single resume day.
    pub fn resolve(&self, resume_date: PartitionKey, today: NaiveDate) -> DateRange {
        let tomorrow = PartitionKey::from_date(today).next_day();
        let start = match self {
            RunMode::Explicit(range) => return *range,
            RunMode::Historical => PartitionKey::history_start(),
            RunMode::Delta => resume_date,
        };
        DateRange::new(start, tomorrow).unwrap_or_else(|_| DateRange::single_day(start))
    }

    /// Reconciliation only follows delta runs
    pub fn runs_reconciliation(&self) -> bool {
        matches!(self, RunMode::Delta)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Explicit(range) => write!(f, "explicit {range}"),
            RunMode::Historical => write!(f, "historical"),
            RunMode::Delta => write!(f, "delta"),
        }
    }
}

/// Today's date on the local clock
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_flag(flag: &str, value: &str) -> Result<PartitionKey> {
    PartitionKey::new(value.trim())
        .map_err(|e| ExporterError::Configuration(format!("{flag}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_explicit_range_wins() {
        let mode = RunMode::from_args(Some("20240101"), Some("20240104"), true).unwrap();
        let range = mode.resolve(key("20230101"), date(2024, 6, 1));
        assert_eq!(range.start, key("20240101"));
        assert_eq!(range.end, key("20240104"));
        assert!(!mode.runs_reconciliation());
    }

    #[test]
    fn test_historical_range() {
        let mode = RunMode::from_args(None, None, true).unwrap();
        let range = mode.resolve(key("20240105"), date(2024, 12, 31));
        assert_eq!(range.start, key("19990101"));
        assert_eq!(range.end, key("20250101"));
    }

    #[test]
    fn test_delta_range_includes_today() {
        let mode = RunMode::from_args(None, None, false).unwrap();
        let range = mode.resolve(key("20240105"), date(2024, 1, 10));
        assert_eq!(range.start, key("20240105"));
        assert_eq!(range.end, key("20240111"));
        assert!(range.contains(&key("20240110")));
        assert!(mode.runs_reconciliation());
    }

    #[test]
    fn test_delta_with_future_resume_date() {
        let range = RunMode::Delta.resolve(key("20300101"), date(2024, 1, 10));
        assert_eq!(range, DateRange::single_day(key("20300101")));
    }

    #[test]
    fn test_padded_flags_are_trimmed() {
        let mode = RunMode::from_args(Some(" 20240101"), Some("20240104 "), false).unwrap();
        assert_eq!(
            mode.resolve(key("20230101"), date(2024, 6, 1)),
            DateRange::new(key("20240101"), key("20240104")).unwrap()
        );
    }

    #[test_case(Some("20240101"), None ; "start only")]
    #[test_case(None, Some("20240101") ; "end only")]
    #[test_case(Some("2024-01-01"), Some("20240102") ; "bad start")]
    #[test_case(Some("20240105"), Some("20240101") ; "reversed")]
    #[test_case(Some("20240105"), Some("20240105") ; "empty range")]
    fn test_invalid_flags(start: Option<&str>, end: Option<&str>) {
        assert!(matches!(
            RunMode::from_args(start, end, false),
            Err(ExporterError::Configuration(_))
        ));
    }
}

//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for the identifiers the exporter works
//! with. Partition keys are calendar dates and always compare as dates, never as
//! raw strings.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wire format of a partition key (`YYYYMMDD`)
pub const PARTITION_KEY_FORMAT: &str = "%Y%m%d";

/// Partition key for a day-partitioned source table
///
/// Wraps a calendar date and renders as an 8-digit `YYYYMMDD` string.
/// Ordering is date ordering.
///
/// # Examples
///
/// ```
/// use billing_exporter::domain::ids::PartitionKey;
/// use std::str::FromStr;
///
/// let key = PartitionKey::from_str("20240131").unwrap();
/// assert_eq!(key.next_day().as_str(), "20240201");
/// assert!(PartitionKey::from_str("2024-01-31").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(NaiveDate);

impl PartitionKey {
    /// Sentinel meaning "beginning of history"
    pub const HISTORY_START: &'static str = "19990101";

    /// Parses an 8-digit `YYYYMMDD` key
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly eight digits forming a valid date.
    pub fn new(key: &str) -> Result<Self, String> {
        if key.len() != 8 || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!(
                "Invalid partition key '{key}': expected 8 digits in YYYYMMDD form"
            ));
        }
        NaiveDate::parse_from_str(key, PARTITION_KEY_FORMAT)
            .map(Self)
            .map_err(|e| format!("Invalid partition key '{key}': {e}"))
    }

    /// Start of history (`19990101`)
    pub fn history_start() -> Self {
        // 1999-01-01 is always a valid date
        Self(NaiveDate::from_ymd_opt(1999, 1, 1).unwrap_or_default())
    }

    /// Creates a key from a calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying calendar date
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Key of the following day
    pub fn next_day(&self) -> Self {
        Self(self.0 + Duration::days(1))
    }

    /// Renders the key as `YYYYMMDD`
    pub fn as_str(&self) -> String {
        self.0.format(PARTITION_KEY_FORMAT).to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(PARTITION_KEY_FORMAT))
    }
}

impl FromStr for PartitionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for PartitionKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for PartitionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        PartitionKey::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// End-exclusive range of partition dates: `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First partition included
    pub start: PartitionKey,
    /// First partition excluded
    pub end: PartitionKey,
}

impl DateRange {
    /// Creates a range, rejecting empty or inverted bounds
    pub fn new(start: PartitionKey, end: PartitionKey) -> Result<Self, String> {
        if start >= end {
            return Err(format!(
                "Invalid date range: start {start} must be before end {end}"
            ));
        }
        Ok(Self { start, end })
    }

    /// One-day range `[key, key + 1)`
    pub fn single_day(key: PartitionKey) -> Self {
        Self {
            start: key,
            end: key.next_day(),
        }
    }

    /// Whether the key falls inside the range
    pub fn contains(&self, key: &PartitionKey) -> bool {
        *key >= self.start && *key < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Fully-qualified source table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// Partition decorator for a single day, e.g. `billing$20240101`
    pub fn partition_decorator(&self, key: &PartitionKey) -> String {
        format!("{}${}", self.table_id, key)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

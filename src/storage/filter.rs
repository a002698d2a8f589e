//! Scalar filters over the ingestion timestamp

use crate::storage::schema::TIME_FIELD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optional inclusive bounds on `ingest_time`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilter {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeFilter {
    /// No bounds
    pub fn none() -> Self {
        Self::default()
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: i64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn until(end: i64) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Bounds given as UTC datetimes, truncated to whole seconds
    pub fn from_datetimes(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start: start.map(|dt| dt.timestamp()),
            end: end.map(|dt| dt.timestamp()),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Scalar filter expression, or `None` when unbounded
    pub fn to_expression(&self) -> Option<FilterExpr> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(FilterExpr::Between { start, end }),
            (Some(start), None) => Some(FilterExpr::AtLeast(start)),
            (None, Some(end)) => Some(FilterExpr::AtMost(end)),
            (None, None) => None,
        }
    }
}

/// Inclusive predicate over `ingest_time`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterExpr {
    Between { start: i64, end: i64 },
    AtLeast(i64),
    AtMost(i64),
}

impl FilterExpr {
    pub fn matches(&self, ingest_time: i64) -> bool {
        match *self {
            FilterExpr::Between { start, end } => start <= ingest_time && ingest_time <= end,
            FilterExpr::AtLeast(start) => ingest_time >= start,
            FilterExpr::AtMost(end) => ingest_time <= end,
        }
    }

    /// Inclusive `(low, high)` bounds for range scans
    pub fn bounds(&self) -> (i64, i64) {
        match *self {
            FilterExpr::Between { start, end } => (start, end),
            FilterExpr::AtLeast(start) => (start, i64::MAX),
            FilterExpr::AtMost(end) => (i64::MIN, end),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Between { start, end } => {
                write!(f, "{} <= {} <= {}", start, TIME_FIELD, end)
            }
            FilterExpr::AtLeast(start) => write!(f, "{} >= {}", TIME_FIELD, start),
            FilterExpr::AtMost(end) => write!(f, "{} <= {}", TIME_FIELD, end),
        }
    }
}

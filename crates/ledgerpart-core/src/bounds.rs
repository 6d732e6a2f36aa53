//! Partition bound parsing and day-range arithmetic.
//!
//! `PostgreSQL` reports a range partition's bounds as an opaque expression
//! string, e.g.:
//!
//! ```text
//! FOR VALUES FROM ('2025-01-15') TO ('2025-01-16')
//! FOR VALUES FROM ('2025-06-01') TO (MAXVALUE)
//! ```
//!
//! [`parse_partition_bounds`] is the single place that text is interpreted;
//! the rest of the system only ever sees typed [`PartitionBounds`]. A bound
//! expression that cannot be parsed becomes [`PartitionBounds::Unknown`] —
//! the planner skips such partitions rather than guessing a range.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A half-open day interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRange {
    /// Inclusive start date.
    pub start: NaiveDate,
    /// Exclusive end date.
    pub end: NaiveDate,
}

impl DayRange {
    /// Creates a range covering a single day `[date, date + 1)`.
    #[must_use]
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date + Days::new(1),
        }
    }

    /// Returns true if `date` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Returns true if two half-open ranges share at least one point.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for DayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Typed partition bounds derived from the catalog's bound expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PartitionBounds {
    /// A dated partition covering `[start, end)`.
    Range(DayRange),
    /// The overflow partition: `[from, +∞)` (upper bound is `MAXVALUE`).
    Unbounded {
        /// Inclusive lower boundary.
        from: NaiveDate,
    },
    /// The bound expression could not be interpreted. Never acted on.
    Unknown,
}

impl PartitionBounds {
    /// Returns true if `date` is covered by these bounds.
    ///
    /// `Unknown` bounds cover nothing: the caller must not assume anything
    /// about a partition it cannot interpret.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            Self::Range(range) => range.contains(date),
            Self::Unbounded { from } => *from <= date,
            Self::Unknown => false,
        }
    }

    /// Returns true if these bounds overlap the given day range.
    ///
    /// The overflow partition's `end` is treated as `+∞`.
    #[must_use]
    pub fn overlaps(&self, range: &DayRange) -> bool {
        match self {
            Self::Range(own) => own.overlaps(range),
            Self::Unbounded { from } => *from < range.end,
            Self::Unknown => false,
        }
    }

    /// Returns the inclusive start date, if known.
    #[must_use]
    pub fn start(&self) -> Option<NaiveDate> {
        match self {
            Self::Range(range) => Some(range.start),
            Self::Unbounded { from } => Some(*from),
            Self::Unknown => None,
        }
    }
}

/// Errors raised while parsing a partition bound expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsParseError {
    /// The expression is not a `FOR VALUES FROM ... TO ...` range bound.
    #[error("not a range bound expression: {0}")]
    NotARangeBound(String),
    /// A bound value could not be parsed as a date.
    #[error("invalid bound date: {0}")]
    InvalidDate(String),
    /// The lower bound is MINVALUE or otherwise unusable as a day boundary.
    #[error("unsupported lower bound: {0}")]
    UnsupportedLowerBound(String),
}

/// Parses a `pg_get_expr(relpartbound, oid)` string into typed bounds.
///
/// Accepts the two shapes the lifecycle manager itself produces: a dated
/// range `FROM ('YYYY-MM-DD') TO ('YYYY-MM-DD')` and the overflow shape
/// `FROM ('YYYY-MM-DD') TO (MAXVALUE)`. Timestamps with a time-of-day
/// component are truncated to the date.
///
/// # Errors
///
/// Returns a [`BoundsParseError`] describing the first unparsable piece.
/// Callers report the error and treat the partition as
/// [`PartitionBounds::Unknown`].
pub fn parse_partition_bounds(expr: &str) -> Result<PartitionBounds, BoundsParseError> {
    let rest = expr
        .trim()
        .strip_prefix("FOR VALUES FROM (")
        .ok_or_else(|| BoundsParseError::NotARangeBound(expr.to_string()))?;

    let (from_raw, rest) = rest
        .split_once(") TO (")
        .ok_or_else(|| BoundsParseError::NotARangeBound(expr.to_string()))?;

    let to_raw = rest
        .strip_suffix(')')
        .ok_or_else(|| BoundsParseError::NotARangeBound(expr.to_string()))?;

    let from = parse_bound_date(from_raw)
        .ok_or_else(|| BoundsParseError::UnsupportedLowerBound(from_raw.to_string()))?;

    if to_raw.trim() == "MAXVALUE" {
        return Ok(PartitionBounds::Unbounded { from });
    }

    let to = parse_bound_date(to_raw)
        .ok_or_else(|| BoundsParseError::InvalidDate(to_raw.to_string()))?;

    Ok(PartitionBounds::Range(DayRange { start: from, end: to }))
}

/// Parses a single quoted bound value, tolerating a time-of-day suffix and
/// an optional type cast (`'2025-01-15 00:00:00'::timestamp`).
fn parse_bound_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.split('\'').next())?;
    let date_part = unquoted.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_dated_range() {
        let bounds =
            parse_partition_bounds("FOR VALUES FROM ('2025-01-15') TO ('2025-01-16')").unwrap();
        assert_eq!(
            bounds,
            PartitionBounds::Range(DayRange {
                start: d("2025-01-15"),
                end: d("2025-01-16"),
            })
        );
    }

    #[test]
    fn test_parse_overflow_bound() {
        let bounds =
            parse_partition_bounds("FOR VALUES FROM ('2025-06-01') TO (MAXVALUE)").unwrap();
        assert_eq!(bounds, PartitionBounds::Unbounded { from: d("2025-06-01") });
    }

    #[test]
    fn test_parse_timestamp_bound_truncates_to_date() {
        let bounds = parse_partition_bounds(
            "FOR VALUES FROM ('2025-01-15 00:00:00') TO ('2025-01-16 00:00:00')",
        )
        .unwrap();
        assert_eq!(
            bounds,
            PartitionBounds::Range(DayRange {
                start: d("2025-01-15"),
                end: d("2025-01-16"),
            })
        );
    }

    #[test]
    fn test_parse_cast_suffix() {
        let bounds = parse_partition_bounds(
            "FOR VALUES FROM ('2025-01-15'::date) TO ('2025-01-16'::date)",
        )
        .unwrap();
        assert!(matches!(bounds, PartitionBounds::Range(_)));
    }

    #[test]
    fn test_parse_rejects_default_partition() {
        let err = parse_partition_bounds("DEFAULT").unwrap_err();
        assert!(matches!(err, BoundsParseError::NotARangeBound(_)));
    }

    #[test]
    fn test_parse_rejects_minvalue_lower_bound() {
        let err =
            parse_partition_bounds("FOR VALUES FROM (MINVALUE) TO ('2025-01-16')").unwrap_err();
        assert!(matches!(err, BoundsParseError::UnsupportedLowerBound(_)));
    }

    #[test]
    fn test_parse_rejects_garbage_date() {
        let err =
            parse_partition_bounds("FOR VALUES FROM ('2025-01-15') TO ('soon')").unwrap_err();
        assert!(matches!(err, BoundsParseError::InvalidDate(_)));
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = DayRange { start: d("2025-01-10"), end: d("2025-01-15") };
        let b = DayRange { start: d("2025-01-15"), end: d("2025-01-20") };
        // Touching end-to-start is not an overlap.
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));

        let c = DayRange { start: d("2025-01-14"), end: d("2025-01-16") };
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn test_unbounded_overlap_treats_end_as_infinity() {
        let overflow = PartitionBounds::Unbounded { from: d("2025-06-01") };
        assert!(overflow.overlaps(&DayRange::single_day(d("2030-01-01"))));
        assert!(!overflow.overlaps(&DayRange::single_day(d("2025-05-31"))));
    }

    #[test]
    fn test_unknown_bounds_cover_nothing() {
        let unknown = PartitionBounds::Unknown;
        assert!(!unknown.contains(d("2025-01-15")));
        assert!(!unknown.overlaps(&DayRange::single_day(d("2025-01-15"))));
        assert_eq!(unknown.start(), None);
    }
}

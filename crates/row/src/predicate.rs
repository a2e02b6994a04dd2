//! Filter predicates with row-level and statistics-level evaluation.
//!
//! Predicates are built once, before planning starts, and are frozen
//! thereafter: every evaluation method takes `&self` and mutates nothing,
//! so a single predicate may be shared across the planner's parallel
//! manifest readers.

use crate::datum::Datum;
use crate::row::Row;
use crate::stats::FieldStats;

/// A filter over rows, referencing fields by position.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equal(usize, Datum),
    NotEqual(usize, Datum),
    LessThan(usize, Datum),
    GreaterThan(usize, Datum),
    LessOrEqual(usize, Datum),
    GreaterOrEqual(usize, Datum),
    IsNull(usize),
    IsNotNull(usize),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction helper.
    #[must_use]
    pub fn and(preds: Vec<Predicate>) -> Predicate {
        Predicate::And(preds)
    }

    /// Evaluates against a concrete row. Out-of-range field positions
    /// evaluate to `false` (never panic during a scan).
    #[must_use]
    pub fn test_row(&self, row: &Row) -> bool {
        use Predicate::*;
        let field = |i: usize| row.0.get(i);
        match self {
            Equal(i, v) => field(*i).map(|d| !d.is_null() && d == v).unwrap_or(false),
            NotEqual(i, v) => field(*i).map(|d| !d.is_null() && d != v).unwrap_or(false),
            LessThan(i, v) => field(*i).map(|d| !d.is_null() && d < v).unwrap_or(false),
            GreaterThan(i, v) => field(*i).map(|d| !d.is_null() && d > v).unwrap_or(false),
            LessOrEqual(i, v) => field(*i).map(|d| !d.is_null() && d <= v).unwrap_or(false),
            GreaterOrEqual(i, v) => field(*i).map(|d| !d.is_null() && d >= v).unwrap_or(false),
            IsNull(i) => field(*i).map(Datum::is_null).unwrap_or(false),
            IsNotNull(i) => field(*i).map(|d| !d.is_null()).unwrap_or(false),
            And(ps) => ps.iter().all(|p| p.test_row(row)),
            Or(ps) => ps.iter().any(|p| p.test_row(row)),
        }
    }

    /// Evaluates against field statistics: returns `false` only when the
    /// stats **prove** no row in the file can match. Missing stats for a
    /// field keep the file (pruning must never drop a possible match).
    #[must_use]
    pub fn test_stats(&self, stats: &[FieldStats], row_count: u64) -> bool {
        use Predicate::*;
        let get = |i: usize| stats.get(i);
        match self {
            Equal(i, v) => get(*i).map(|s| value_in_range(s, v)).unwrap_or(true),
            NotEqual(i, v) => get(*i)
                // Only prunable when every row equals v: min == max == v
                // and there are no nulls.
                .map(|s| {
                    !(s.null_count == 0
                        && s.min.as_ref() == Some(v)
                        && s.max.as_ref() == Some(v))
                })
                .unwrap_or(true),
            LessThan(i, v) => get(*i)
                .map(|s| match &s.min {
                    Some(min) => min < v,
                    None => s.null_count < row_count,
                })
                .unwrap_or(true),
            GreaterThan(i, v) => get(*i)
                .map(|s| match &s.max {
                    Some(max) => max > v,
                    None => s.null_count < row_count,
                })
                .unwrap_or(true),
            LessOrEqual(i, v) => get(*i)
                .map(|s| match &s.min {
                    Some(min) => min <= v,
                    None => s.null_count < row_count,
                })
                .unwrap_or(true),
            GreaterOrEqual(i, v) => get(*i)
                .map(|s| match &s.max {
                    Some(max) => max >= v,
                    None => s.null_count < row_count,
                })
                .unwrap_or(true),
            IsNull(i) => get(*i).map(|s| s.null_count > 0).unwrap_or(true),
            IsNotNull(i) => get(*i).map(|s| s.null_count < row_count).unwrap_or(true),
            And(ps) => ps.iter().all(|p| p.test_stats(stats, row_count)),
            Or(ps) => ps.iter().any(|p| p.test_stats(stats, row_count)),
        }
    }
}

/// `true` when `v` may fall inside the file's `[min, max]` for a field.
/// A field with no min/max (all nulls) cannot contain `v`.
fn value_in_range(s: &FieldStats, v: &Datum) -> bool {
    match (&s.min, &s.max) {
        (Some(min), Some(max)) => v >= min && v <= max,
        _ => false,
    }
}

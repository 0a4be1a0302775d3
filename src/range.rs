//! Parsing and membership checks for task quantity ranges.
//!
//! A range travels as a comma separated list of non-negative integers in
//! ascending order, e.g. `"2,4,6"`. Operator input is sanitized the same way
//! the edit field does it: every character that is not a digit or a comma is
//! dropped before the list is split, so `"4, 2;2"` reads as `"4,22"`.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Stored range value that means "no constraint defined". Tasks carrying it
/// are left out of the resolved view.
pub const NO_CONSTRAINT: &str = "0";

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9,]").expect("range sanitizer pattern"));

/// Ordered set of distinct allowed quantities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet(BTreeSet<i64>);

impl RangeSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.0.contains(&value)
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    /// Comma-joined ascending form; the empty set yields `""`.
    pub fn serialize(&self) -> String {
        self.0
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// True when persisting this set would write the [`NO_CONSTRAINT`] sentinel.
    pub fn is_no_constraint(&self) -> bool {
        self.0.len() == 1 && self.0.contains(&0)
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromIterator<i64> for RangeSet {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        RangeSet(iter.into_iter().filter(|value| *value >= 0).collect())
    }
}

/// Drop every character outside `0-9` and `,`.
pub fn sanitize(raw: &str) -> Cow<'_, str> {
    DISALLOWED.replace_all(raw, "")
}

/// Parse operator or stored input into a deduplicated ascending set.
///
/// Tokens that are empty after sanitizing, or too large for an `i64`, are
/// discarded. The function never fails; an unusable input yields the empty
/// set, which callers must reject before persisting.
pub fn normalize(raw: &str) -> RangeSet {
    sanitize(raw)
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<i64>().ok())
        .collect()
}

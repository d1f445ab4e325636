//! Range options and their normalized form.
//!
//! [`RangeOptions`] is the caller-facing query surface (`gt`/`gte`/`lt`/`lte`,
//! `reverse`, `limit`). [`RangeOptions::normalize`] validates it into a
//! [`KeyRange`], the form every other component works with.

use std::ops::Bound::{self, Excluded, Included, Unbounded};
use std::ops::RangeBounds;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::key::{lex_increment, Direction};

/// Errors from normalizing [`RangeOptions`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("gt and gte are mutually exclusive")]
    ConflictingLowerBound,
    #[error("lt and lte are mutually exclusive")]
    ConflictingUpperBound,
}

/// Caller-facing range query options.
///
/// At most one of `gt`/`gte` and one of `lt`/`lte` may be set. Bounds are
/// expressed in key space regardless of `reverse`: `gte` is always the
/// smaller end. An empty bound is treated as unset. `limit: None` is
/// unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeOptions {
    pub gt: Option<Bytes>,
    pub gte: Option<Bytes>,
    pub lt: Option<Bytes>,
    pub lte: Option<Bytes>,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl RangeOptions {
    /// Options selecting every key in ascending order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower bound, exclusive.
    #[must_use]
    pub fn gt(mut self, key: impl Into<Bytes>) -> Self {
        self.gt = Some(key.into());
        self
    }

    /// Lower bound, inclusive.
    #[must_use]
    pub fn gte(mut self, key: impl Into<Bytes>) -> Self {
        self.gte = Some(key.into());
        self
    }

    /// Upper bound, exclusive.
    #[must_use]
    pub fn lt(mut self, key: impl Into<Bytes>) -> Self {
        self.lt = Some(key.into());
        self
    }

    /// Upper bound, inclusive.
    #[must_use]
    pub fn lte(mut self, key: impl Into<Bytes>) -> Self {
        self.lte = Some(key.into());
        self
    }

    /// Iterates in descending key order.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Returns at most `limit` entries.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validates the options into a [`KeyRange`].
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] if both the exclusive and inclusive variant of
    /// one side are set. An empty bound counts as set for that check but
    /// otherwise leaves its side open.
    pub fn normalize(&self) -> Result<KeyRange, RangeError> {
        let lower = match (&self.gt, &self.gte) {
            (Some(_), Some(_)) => return Err(RangeError::ConflictingLowerBound),
            (Some(k), None) if !k.is_empty() => Excluded(k.clone()),
            (None, Some(k)) if !k.is_empty() => Included(k.clone()),
            _ => Unbounded,
        };
        let upper = match (&self.lt, &self.lte) {
            (Some(_), Some(_)) => return Err(RangeError::ConflictingUpperBound),
            (Some(k), None) if !k.is_empty() => Excluded(k.clone()),
            (None, Some(k)) if !k.is_empty() => Included(k.clone()),
            _ => Unbounded,
        };

        Ok(KeyRange {
            lower,
            upper,
            reverse: self.reverse,
            limit: self.limit,
        })
    }
}

/// A normalized key range: bounds, direction and an optional result limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Bytes>,
    pub upper: Bound<Bytes>,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl KeyRange {
    /// Creates an ascending, unlimited range between two bounds.
    #[must_use]
    pub fn new(lower: Bound<Bytes>, upper: Bound<Bytes>) -> Self {
        Self {
            lower,
            upper,
            reverse: false,
            limit: None,
        }
    }

    /// A range that scans everything.
    #[must_use]
    pub fn full() -> Self {
        Self::new(Unbounded, Unbounded)
    }

    /// A range covering every key that starts with `prefix`.
    #[must_use]
    pub fn prefix(prefix: impl Into<Bytes>) -> Self {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Self::full();
        }
        match lex_increment(&prefix) {
            Some(end) => Self::new(Included(prefix), Excluded(end)),
            None => Self::new(Included(prefix), Unbounded),
        }
    }

    /// Sets the iteration direction.
    #[must_use]
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Sets the maximum number of results.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// The iteration direction as a [`Direction`].
    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::from_reverse(self.reverse)
    }

    /// Returns `true` if `key` satisfies both bounds. Ignores `limit`.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        (match &self.lower {
            Included(s) => key >= &s[..],
            Excluded(s) => key > &s[..],
            Unbounded => true,
        }) && (match &self.upper {
            Included(e) => key <= &e[..],
            Excluded(e) => key < &e[..],
            Unbounded => true,
        })
    }

    /// Returns `true` if the bounds alone guarantee that no key matches.
    ///
    /// A range with `limit == Some(0)` is not considered empty here; the
    /// limit is applied by whoever produces the results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (_, Excluded(e)) if e.is_empty() => true,
            (Included(s), Included(e)) => s > e,
            (Included(s) | Excluded(s), Excluded(e)) | (Excluded(s), Included(e)) => s >= e,
            _ => false,
        }
    }

    /// Returns `true` when neither side is bounded.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        matches!((&self.lower, &self.upper), (Unbounded, Unbounded))
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::full()
    }
}

impl RangeBounds<Bytes> for KeyRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.lower.as_ref()
    }

    fn end_bound(&self) -> Bound<&Bytes> {
        self.upper.as_ref()
    }
}

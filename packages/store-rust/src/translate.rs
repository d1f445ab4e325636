//! Global-to-local range translation.
//!
//! A mount with prefix `p` holds the global keys `p ‖ x` for every local key
//! `x`. Each bound of a global range is classified against `p` by raw byte
//! comparison:
//!
//! - the bound starts with `p`: it pins the mount and is stripped to local
//!   coordinates, keeping its inclusivity;
//! - the bound sorts entirely before (lower) or after (upper) the prefix
//!   span: that side places no constraint on the mount;
//! - otherwise the whole span lies outside the range and the mount is
//!   excluded.
//!
//! `limit` is never translated; it only applies to the merged output.

use std::cmp::Ordering;
use std::ops::Bound::{self, Excluded, Included, Unbounded};

use bytes::Bytes;
use mountkv_core::key::{compare, strip_prefix};
use mountkv_core::KeyRange;

/// A global range seen from one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalRange {
    /// No key of the mount can fall inside the range.
    Excluded,
    /// Every key of the mount falls inside the range.
    Full,
    /// Only keys inside these local bounds can match.
    Bounded {
        lower: Bound<Bytes>,
        upper: Bound<Bytes>,
    },
}

impl LocalRange {
    /// Converts to a local [`KeyRange`] scanned in the given direction, or
    /// `None` if the mount is excluded.
    #[must_use]
    pub fn into_key_range(self, reverse: bool) -> Option<KeyRange> {
        match self {
            Self::Excluded => None,
            Self::Full => Some(KeyRange::full().with_reverse(reverse)),
            Self::Bounded { lower, upper } => {
                Some(KeyRange::new(lower, upper).with_reverse(reverse))
            }
        }
    }
}

/// Constraint one global bound places on a mount.
enum Side {
    Open,
    Pinned(Bound<Bytes>),
    Outside,
}

fn pin(bound: &Bound<Bytes>, prefix: &[u8]) -> Option<Bound<Bytes>> {
    match bound {
        Included(key) => strip_prefix(key, prefix).map(Included),
        Excluded(key) => strip_prefix(key, prefix).map(Excluded),
        Unbounded => None,
    }
}

fn bound_key(bound: &Bound<Bytes>) -> Option<&Bytes> {
    match bound {
        Included(key) | Excluded(key) => Some(key),
        Unbounded => None,
    }
}

fn lower_side(bound: &Bound<Bytes>, prefix: &[u8]) -> Side {
    let Some(key) = bound_key(bound) else {
        return Side::Open;
    };
    if let Some(local) = pin(bound, prefix) {
        return Side::Pinned(local);
    }
    // Not a prefix match, so the comparison is decided inside the prefix.
    match compare(key, prefix) {
        Ordering::Less => Side::Open,
        _ => Side::Outside,
    }
}

fn upper_side(bound: &Bound<Bytes>, prefix: &[u8]) -> Side {
    let Some(key) = bound_key(bound) else {
        return Side::Open;
    };
    if let Some(local) = pin(bound, prefix) {
        return Side::Pinned(local);
    }
    match compare(key, prefix) {
        Ordering::Greater => Side::Open,
        _ => Side::Outside,
    }
}

/// Translates `range` into the local coordinates of the mount at `prefix`.
///
/// The empty prefix always receives the global bounds unchanged.
#[must_use]
pub fn translate(range: &KeyRange, prefix: &[u8]) -> LocalRange {
    let lower = match lower_side(&range.lower, prefix) {
        Side::Outside => return LocalRange::Excluded,
        Side::Open => Unbounded,
        Side::Pinned(bound) => bound,
    };
    let upper = match upper_side(&range.upper, prefix) {
        Side::Outside => return LocalRange::Excluded,
        Side::Open => Unbounded,
        Side::Pinned(bound) => bound,
    };

    let local = KeyRange::new(lower, upper);
    if local.is_empty() {
        LocalRange::Excluded
    } else if local.is_unbounded() {
        LocalRange::Full
    } else {
        LocalRange::Bounded {
            lower: local.lower,
            upper: local.upper,
        }
    }
}

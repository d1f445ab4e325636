//! Byte-key ordering and prefix arithmetic.
//!
//! Every key in `mountkv` is a [`Bytes`] value compared lexicographically
//! over its raw bytes. Text keys are accepted through `Into<Bytes>` and
//! compared by their UTF-8 encoding; no case or encoding normalization is
//! ever applied.

use std::cmp::Ordering;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Iteration direction of a range scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Reverse,
}

impl Direction {
    /// Maps a `reverse` flag to a direction.
    #[must_use]
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse {
            Self::Reverse
        } else {
            Self::Forward
        }
    }

    /// Orders two keys so that `Ordering::Less` means "`a` is produced first".
    #[must_use]
    pub fn order(self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Self::Forward => compare(a, b),
            Self::Reverse => compare(b, a),
        }
    }
}

/// Total order over keys: plain lexicographic byte comparison.
#[must_use]
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Returns `true` when the leading bytes of `key` equal `prefix`.
///
/// The empty prefix matches every key.
#[must_use]
pub fn has_prefix(key: &[u8], prefix: &[u8]) -> bool {
    key.starts_with(prefix)
}

/// Strips `prefix` from `key` without copying.
///
/// Returns `None` if `key` does not start with `prefix`.
#[must_use]
pub fn strip_prefix(key: &Bytes, prefix: &[u8]) -> Option<Bytes> {
    has_prefix(key, prefix).then(|| key.slice(prefix.len()..))
}

/// Reconstructs a global key from a mount prefix and a local key.
#[must_use]
pub fn join(prefix: &[u8], local: &[u8]) -> Bytes {
    if prefix.is_empty() {
        return Bytes::copy_from_slice(local);
    }
    let mut buf = BytesMut::with_capacity(prefix.len() + local.len());
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(local);
    buf.freeze()
}

/// Computes the smallest byte sequence strictly greater than every key
/// that starts with `data`.
///
/// Returns `None` when no such sequence exists (`data` is empty or made
/// only of `0xFF` bytes).
///
/// - `b"a"` → `Some(b"b")`
/// - `[0x61, 0xFF]` → `Some(b"b")`
/// - `[0xFF]` → `None`
#[must_use]
pub fn lex_increment(data: &[u8]) -> Option<Bytes> {
    let mut result = BytesMut::from(data);

    while let Some(last) = result.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(result.freeze());
        }
        result.truncate(result.len() - 1);
    }

    None
}

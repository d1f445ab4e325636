//! Error types for the composite store.

use bytes::Bytes;
use mountkv_core::RangeError;

/// A failed per-mount operation inside a fan-out.
#[derive(Debug)]
pub struct MountFailure {
    /// Prefix of the mount whose backing store failed.
    pub prefix: Bytes,
    /// The backing store's error, unchanged.
    pub error: anyhow::Error,
}

/// Errors returned by the composite store.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    /// No mount matched a key. Unreachable for a table with a root mount.
    #[error("no mount matches key {key:?}; the root mount is missing")]
    ResolutionInvariantViolation { key: Bytes },

    /// A backing store call failed; the error is passed through verbatim.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),

    /// Some per-mount sub-batches failed. Sub-batches that succeeded on
    /// other mounts are not rolled back.
    #[error("batch failed on {} of {total} mounts: {}", failed.len(), describe_failures(failed))]
    PartialBatch {
        failed: Vec<MountFailure>,
        total: usize,
    },

    /// Ending one or more mount iterators failed. Every iterator was still
    /// asked to end; `source` is the first failure observed.
    #[error("failed to end {failures} of {total} mount iterators")]
    IteratorClose {
        failures: usize,
        total: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("iterator has already ended")]
    IteratorEnded,

    /// Two mounts produced the same global key during a merge.
    #[error("mounts {first:?} and {second:?} both produced key {key:?}")]
    DuplicateKey {
        key: Bytes,
        first: Bytes,
        second: Bytes,
    },

    #[error("mount prefix {prefix:?} is registered twice")]
    DuplicatePrefix { prefix: Bytes },

    #[error("the empty prefix is reserved for the root store")]
    EmptyPrefix,

    #[error(transparent)]
    InvalidRange(#[from] RangeError),
}

impl MountError {
    /// Converts into an opaque backend error for [`KvStore`](crate::KvStore)
    /// callers. Backend errors are unwrapped so they stay verbatim.
    #[must_use]
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            Self::Backend(error) => error,
            other => other.into(),
        }
    }
}

fn describe_failures(failed: &[MountFailure]) -> String {
    failed
        .iter()
        .map(|f| format!("{:?}: {}", f.prefix, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

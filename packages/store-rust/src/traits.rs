//! Backing-store contract consumed by the mount layer.
//!
//! Every mount is backed by an [`Arc<dyn KvStore>`](KvStore). The composite
//! [`MountStore`](crate::MountStore) implements the same trait, so composite
//! stores can be mounted inside each other.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mountkv_core::{BatchOp, KeyRange};

use crate::changes::ChangeObserver;
use crate::config::OpenOptions;

/// Options for point reads. Passed to the owning store unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Whether the read should populate store-level caches.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { fill_cache: true }
    }
}

/// Options for writes. Passed to the owning store(s) unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Whether the write must be durable before it is acknowledged.
    pub sync: bool,
}

/// Ordered key-value store.
///
/// Keys are compared lexicographically over bytes. Implementations must
/// return iterator entries in that order (descending when the range is
/// reversed) and honor the range's bounds and limit.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn open(&self, options: &OpenOptions) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;

    /// Returns `None` when the key does not exist.
    async fn get(&self, key: &Bytes, options: &ReadOptions) -> anyhow::Result<Option<Bytes>>;

    async fn put(&self, key: Bytes, value: Bytes, options: &WriteOptions) -> anyhow::Result<()>;

    async fn del(&self, key: Bytes, options: &WriteOptions) -> anyhow::Result<()>;

    /// Applies all operations atomically, in order.
    async fn batch(&self, ops: Vec<BatchOp>, options: &WriteOptions) -> anyhow::Result<()>;

    /// Opens an iterator over `range`.
    ///
    /// The returned iterator owns its resources and must be released with
    /// [`KvIterator::end`].
    async fn iterator(&self, range: KeyRange) -> anyhow::Result<Box<dyn KvIterator>>;

    /// Registers an observer for this store's writes.
    ///
    /// Returns `false` if the store does not emit change events.
    fn subscribe(&self, _observer: Arc<dyn ChangeObserver>) -> bool {
        false
    }
}

/// Cursor over a [`KvStore`] range.
#[async_trait]
pub trait KvIterator: Send {
    /// Returns the next entry, or `None` once the range is exhausted.
    async fn next(&mut self) -> anyhow::Result<Option<(Bytes, Bytes)>>;

    /// Releases the iterator. Further `next` calls fail.
    async fn end(&mut self) -> anyhow::Result<()>;
}

//! In-memory [`KvStore`] backed by a [`BTreeMap`].
//!
//! Keeps entries ordered by key so range scans are a direct walk over the
//! map. Suitable for tests, ephemeral mounts (e.g. a `!tmp!` mount), and
//! any workload that fits in memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use mountkv_core::{BatchOp, KeyRange};
use parking_lot::RwLock;

use crate::changes::{ChangeObserver, CompositeChangeObserver};
use crate::config::OpenOptions;
use crate::traits::{KvIterator, KvStore, ReadOptions, WriteOptions};

/// Ordered in-memory store.
///
/// Batches are applied under a single write lock, so they are atomic with
/// respect to readers. Iterators work on a snapshot taken when they are
/// opened and do not observe later writes.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Bytes, Bytes>>,
    observers: RwLock<CompositeChangeObserver>,
    created: AtomicBool,
    open: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `open` succeeded and `close` has not been called since.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns a copy of every entry in key order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Bytes, Bytes)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn open(&self, options: &OpenOptions) -> anyhow::Result<()> {
        let created = self.created.load(Ordering::Acquire);
        if created && options.error_if_exists {
            bail!("store already exists");
        }
        if !created && !options.create_if_missing {
            bail!("store does not exist and create_if_missing is false");
        }
        self.created.store(true, Ordering::Release);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: &Bytes, _options: &ReadOptions) -> anyhow::Result<Option<Bytes>> {
        Ok(self.entries.read().get(key).cloned())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn put(&self, key: Bytes, value: Bytes, _options: &WriteOptions) -> anyhow::Result<()> {
        self.entries.write().insert(key.clone(), value.clone());
        self.observers.read().on_put(&key, &value);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn del(&self, key: Bytes, _options: &WriteOptions) -> anyhow::Result<()> {
        self.entries.write().remove(&key);
        self.observers.read().on_del(&key);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn batch(&self, ops: Vec<BatchOp>, _options: &WriteOptions) -> anyhow::Result<()> {
        {
            let mut entries = self.entries.write();
            for op in &ops {
                match op {
                    BatchOp::Put { key, value } => {
                        entries.insert(key.clone(), value.clone());
                    }
                    BatchOp::Del { key } => {
                        entries.remove(key);
                    }
                }
            }
        }
        self.observers.read().on_batch(&ops);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn iterator(&self, range: KeyRange) -> anyhow::Result<Box<dyn KvIterator>> {
        // BTreeMap::range panics on inverted bounds.
        if range.is_empty() || range.limit == Some(0) {
            return Ok(Box::new(MemoryIterator::new(Vec::new())));
        }

        let entries = self.entries.read();
        let scan = entries
            .range(range.clone())
            .map(|(k, v)| (k.clone(), v.clone()));
        let limit = range.limit.unwrap_or(usize::MAX);
        let records: Vec<(Bytes, Bytes)> = if range.reverse {
            scan.rev().take(limit).collect()
        } else {
            scan.take(limit).collect()
        };

        Ok(Box::new(MemoryIterator::new(records)))
    }

    fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> bool {
        self.observers.write().add(observer);
        true
    }
}

struct MemoryIterator {
    records: std::vec::IntoIter<(Bytes, Bytes)>,
    ended: bool,
}

impl MemoryIterator {
    fn new(records: Vec<(Bytes, Bytes)>) -> Self {
        Self {
            records: records.into_iter(),
            ended: false,
        }
    }
}

#[async_trait]
impl KvIterator for MemoryIterator {
    async fn next(&mut self) -> anyhow::Result<Option<(Bytes, Bytes)>> {
        if self.ended {
            bail!("iterator has ended");
        }
        Ok(self.records.next())
    }

    async fn end(&mut self) -> anyhow::Result<()> {
        if self.ended {
            bail!("iterator has already ended");
        }
        self.ended = true;
        Ok(())
    }
}

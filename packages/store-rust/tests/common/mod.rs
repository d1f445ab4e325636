//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use mountkv::{
    BatchOp, ChangeObserver, KeyRange, KvIterator, KvStore, MemoryStore, OpenOptions, ReadOptions,
    WriteOptions,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Operations an [`InstrumentedStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fail {
    Open,
    Close,
    Batch,
    IteratorOpen,
    IteratorNext,
    IteratorEnd,
}

/// [`MemoryStore`] wrapper with failure injection and iterator accounting.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemoryStore,
    failures: Mutex<HashSet<Fail>>,
    iterators_opened: AtomicUsize,
    iterators_ended: Arc<AtomicUsize>,
    /// Iterators fail `next` once they have produced this many entries.
    next_fails_after: Mutex<Option<usize>>,
}

impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(fail: Fail) -> Arc<Self> {
        let store = Self::new();
        store.fail_on(fail);
        store
    }

    pub fn fail_on(&self, fail: Fail) {
        self.failures.lock().insert(fail);
    }

    /// Lets each new iterator produce `entries` entries before `next` fails.
    pub fn fail_next_after(&self, entries: usize) {
        *self.next_fails_after.lock() = Some(entries);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn iterators_opened(&self) -> usize {
        self.iterators_opened.load(Ordering::SeqCst)
    }

    /// Number of `end` calls on this store's iterators, failed ones included.
    pub fn iterators_ended(&self) -> usize {
        self.iterators_ended.load(Ordering::SeqCst)
    }

    fn fails(&self, fail: Fail) -> bool {
        self.failures.lock().contains(&fail)
    }
}

#[async_trait]
impl KvStore for InstrumentedStore {
    async fn open(&self, options: &OpenOptions) -> anyhow::Result<()> {
        if self.fails(Fail::Open) {
            bail!("injected open failure");
        }
        self.inner.open(options).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        if self.fails(Fail::Close) {
            bail!("injected close failure");
        }
        self.inner.close().await
    }

    async fn get(&self, key: &Bytes, options: &ReadOptions) -> anyhow::Result<Option<Bytes>> {
        self.inner.get(key, options).await
    }

    async fn put(&self, key: Bytes, value: Bytes, options: &WriteOptions) -> anyhow::Result<()> {
        self.inner.put(key, value, options).await
    }

    async fn del(&self, key: Bytes, options: &WriteOptions) -> anyhow::Result<()> {
        self.inner.del(key, options).await
    }

    async fn batch(&self, ops: Vec<BatchOp>, options: &WriteOptions) -> anyhow::Result<()> {
        if self.fails(Fail::Batch) {
            bail!("injected batch failure");
        }
        self.inner.batch(ops, options).await
    }

    async fn iterator(&self, range: KeyRange) -> anyhow::Result<Box<dyn KvIterator>> {
        if self.fails(Fail::IteratorOpen) {
            bail!("injected iterator open failure");
        }
        let inner = self.inner.iterator(range).await?;
        self.iterators_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedIterator {
            inner,
            ended: self.iterators_ended.clone(),
            fail_next: self.fails(Fail::IteratorNext),
            fail_after: *self.next_fails_after.lock(),
            pulled: 0,
            fail_end: self.fails(Fail::IteratorEnd),
        }))
    }

    fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> bool {
        self.inner.subscribe(observer)
    }
}

struct TrackedIterator {
    inner: Box<dyn KvIterator>,
    ended: Arc<AtomicUsize>,
    fail_next: bool,
    fail_after: Option<usize>,
    pulled: usize,
    fail_end: bool,
}

#[async_trait]
impl KvIterator for TrackedIterator {
    async fn next(&mut self) -> anyhow::Result<Option<(Bytes, Bytes)>> {
        if self.fail_next || self.fail_after.is_some_and(|after| self.pulled >= after) {
            bail!("injected iterator next failure");
        }
        let entry = self.inner.next().await?;
        if entry.is_some() {
            self.pulled += 1;
        }
        Ok(entry)
    }

    async fn end(&mut self) -> anyhow::Result<()> {
        self.ended.fetch_add(1, Ordering::SeqCst);
        self.inner.end().await?;
        if self.fail_end {
            bail!("injected iterator end failure");
        }
        Ok(())
    }
}

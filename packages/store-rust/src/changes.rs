//! Change-feed observers.
//!
//! Stores that emit change events notify a [`ChangeObserver`] after every
//! successful write. [`CompositeChangeObserver`] fans one event out to many
//! observers; [`PrefixedObserver`] re-addresses events from a mount's local
//! key space into the composite store's global key space.

use std::sync::Arc;

use bytes::Bytes;
use mountkv_core::key::join;
use mountkv_core::BatchOp;

/// Observer for writes applied to a store.
///
/// Used as `Arc<dyn ChangeObserver>`.
pub trait ChangeObserver: Send + Sync {
    /// Called after a single key is written.
    fn on_put(&self, key: &Bytes, value: &Bytes);

    /// Called after a single key is deleted.
    fn on_del(&self, key: &Bytes);

    /// Called after a batch is applied.
    fn on_batch(&self, ops: &[BatchOp]);
}

/// Composite observer that fans out to multiple observers.
#[derive(Default)]
pub struct CompositeChangeObserver {
    observers: Vec<Arc<dyn ChangeObserver>>,
}

impl CompositeChangeObserver {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn ChangeObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn ChangeObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl ChangeObserver for CompositeChangeObserver {
    fn on_put(&self, key: &Bytes, value: &Bytes) {
        for observer in &self.observers {
            observer.on_put(key, value);
        }
    }

    fn on_del(&self, key: &Bytes) {
        for observer in &self.observers {
            observer.on_del(key);
        }
    }

    fn on_batch(&self, ops: &[BatchOp]) {
        for observer in &self.observers {
            observer.on_batch(ops);
        }
    }
}

/// Forwards events to `inner` with `prefix` prepended to every key.
pub struct PrefixedObserver {
    prefix: Bytes,
    inner: Arc<dyn ChangeObserver>,
}

impl PrefixedObserver {
    #[must_use]
    pub fn new(prefix: Bytes, inner: Arc<dyn ChangeObserver>) -> Self {
        Self { prefix, inner }
    }
}

impl ChangeObserver for PrefixedObserver {
    fn on_put(&self, key: &Bytes, value: &Bytes) {
        self.inner.on_put(&join(&self.prefix, key), value);
    }

    fn on_del(&self, key: &Bytes) {
        self.inner.on_del(&join(&self.prefix, key));
    }

    fn on_batch(&self, ops: &[BatchOp]) {
        let ops: Vec<BatchOp> = ops
            .iter()
            .map(|op| {
                let key = join(&self.prefix, op.key());
                op.clone().with_key(key)
            })
            .collect();
        self.inner.on_batch(&ops);
    }
}

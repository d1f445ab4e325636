//! Composite ordered store over a [`MountTable`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mountkv_core::{BatchOp, KeyRange, RangeOptions};
use tracing::{debug, warn};

use crate::changes::{ChangeObserver, PrefixedObserver};
use crate::config::{MountStoreConfig, OpenOptions};
use crate::error::{MountError, MountFailure};
use crate::fanout::{first_failure, settle_all};
use crate::merge::MergeIterator;
use crate::mount::{MountSpec, MountTable};
use crate::traits::{KvIterator, KvStore, ReadOptions, WriteOptions};

/// One ordered key-value store assembled from prefix-routed mounts.
///
/// Point operations go to the mount owning the key; batches are split per
/// mount; iterators merge every mount that can contribute to the range.
pub struct MountStore {
    table: MountTable,
    config: MountStoreConfig,
}

impl MountStore {
    /// Creates a store over `table` with the default configuration.
    #[must_use]
    pub fn new(table: MountTable) -> Self {
        Self::with_config(table, MountStoreConfig::default())
    }

    /// Creates a store over `table` with an explicit configuration.
    #[must_use]
    pub fn with_config(table: MountTable, config: MountStoreConfig) -> Self {
        Self { table, config }
    }

    /// Builds the table from a root store and a list of prefixed mounts.
    ///
    /// # Errors
    ///
    /// See [`MountTableBuilder::build`](crate::MountTableBuilder::build).
    pub fn from_specs(
        root: Arc<dyn KvStore>,
        mounts: Vec<MountSpec>,
        config: MountStoreConfig,
    ) -> Result<Self, MountError> {
        Ok(Self::with_config(MountTable::new(root, mounts)?, config))
    }

    /// The mounts this store routes over.
    #[must_use]
    pub fn table(&self) -> &MountTable {
        &self.table
    }

    /// The configuration the store was built with.
    #[must_use]
    pub fn config(&self) -> &MountStoreConfig {
        &self.config
    }

    /// Opens every mount with its own [`OpenOptions`].
    ///
    /// # Errors
    ///
    /// Returns the first observed backend failure. Every mount is still
    /// attempted; the remaining failures are logged.
    #[tracing::instrument(skip_all, fields(store = %self.config.name))]
    pub async fn open(&self) -> Result<(), MountError> {
        let failures = settle_all(
            self.table
                .mounts()
                .map(|mount| (mount.prefix().clone(), mount.store().open(mount.options()))),
        )
        .await;
        if let Some(error) = first_failure(&self.config.name, "open", failures) {
            return Err(MountError::Backend(error));
        }
        debug!(mounts = self.table.mounts().len(), "mounts opened");
        Ok(())
    }

    /// Closes every mount.
    ///
    /// # Errors
    ///
    /// Same policy as [`open`](Self::open).
    #[tracing::instrument(skip_all, fields(store = %self.config.name))]
    pub async fn close(&self) -> Result<(), MountError> {
        let failures = settle_all(
            self.table
                .mounts()
                .map(|mount| (mount.prefix().clone(), mount.store().close())),
        )
        .await;
        if let Some(error) = first_failure(&self.config.name, "close", failures) {
            return Err(MountError::Backend(error));
        }
        debug!(mounts = self.table.mounts().len(), "mounts closed");
        Ok(())
    }

    /// Reads `key` from the mount that owns it.
    ///
    /// # Errors
    ///
    /// Backend errors are returned unchanged.
    #[tracing::instrument(level = "trace", skip_all, fields(store = %self.config.name))]
    pub async fn get(
        &self,
        key: impl Into<Bytes>,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, MountError> {
        let key = key.into();
        let resolved = self.table.resolve(&key)?;
        Ok(resolved.mount.store().get(&resolved.local_key, options).await?)
    }

    /// # Errors
    ///
    /// Backend errors are returned unchanged.
    #[tracing::instrument(level = "trace", skip_all, fields(store = %self.config.name))]
    pub async fn put(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        options: &WriteOptions,
    ) -> Result<(), MountError> {
        let key = key.into();
        let resolved = self.table.resolve(&key)?;
        resolved
            .mount
            .store()
            .put(resolved.local_key, value.into(), options)
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Backend errors are returned unchanged.
    #[tracing::instrument(level = "trace", skip_all, fields(store = %self.config.name))]
    pub async fn del(&self, key: impl Into<Bytes>, options: &WriteOptions) -> Result<(), MountError> {
        let key = key.into();
        let resolved = self.table.resolve(&key)?;
        resolved.mount.store().del(resolved.local_key, options).await?;
        Ok(())
    }

    /// Splits `ops` per mount and applies the sub-batches concurrently.
    ///
    /// Each sub-batch is atomic within its store. There is no atomicity
    /// across mounts and nothing is rolled back when a sub-batch fails.
    ///
    /// # Errors
    ///
    /// A batch touching one mount returns that store's error unchanged. A
    /// batch touching several mounts returns [`MountError::PartialBatch`]
    /// naming every mount whose sub-batch failed.
    #[tracing::instrument(level = "trace", skip_all, fields(store = %self.config.name))]
    pub async fn batch(&self, ops: Vec<BatchOp>, options: &WriteOptions) -> Result<(), MountError> {
        let grouped = self.table.group_by_mount(ops)?;
        let total = grouped.len();
        let mut failures = settle_all(
            grouped
                .into_iter()
                .map(|(mount, ops)| (mount.prefix().clone(), mount.store().batch(ops, options))),
        )
        .await;

        if failures.is_empty() {
            return Ok(());
        }
        if total == 1 {
            if let Some((_, error)) = failures.pop() {
                return Err(MountError::Backend(error));
            }
        }
        warn!(failed = failures.len(), total, "batch partially applied");
        Err(MountError::PartialBatch {
            failed: failures
                .into_iter()
                .map(|(prefix, error)| MountFailure { prefix, error })
                .collect(),
            total,
        })
    }

    /// Opens a merged iterator over the caller-facing range options.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::InvalidRange`] for conflicting bounds and
    /// backend errors from opening the local iterators.
    pub async fn iterator(&self, options: &RangeOptions) -> Result<MergeIterator, MountError> {
        self.range_iterator(options.normalize()?).await
    }

    /// Opens a merged iterator over an already normalized range.
    ///
    /// # Errors
    ///
    /// See [`MergeIterator::open`].
    pub async fn range_iterator(&self, range: KeyRange) -> Result<MergeIterator, MountError> {
        MergeIterator::open(&self.table, range, &self.config).await
    }

    /// Collects every entry in range. The iterator is always ended, also
    /// when reading fails.
    ///
    /// # Errors
    ///
    /// Returns the first read error, otherwise the error from ending the
    /// iterator.
    pub async fn scan(&self, options: &RangeOptions) -> Result<Vec<(Bytes, Bytes)>, MountError> {
        let iter = self.iterator(options).await?;
        self.drain(iter).await
    }

    /// Collects every entry whose key starts with `prefix`, in ascending
    /// order unless `reverse` is set.
    ///
    /// # Errors
    ///
    /// Same as [`scan`](Self::scan).
    pub async fn scan_prefix(
        &self,
        prefix: impl Into<Bytes>,
        reverse: bool,
    ) -> Result<Vec<(Bytes, Bytes)>, MountError> {
        let range = KeyRange::prefix(prefix).with_reverse(reverse);
        let iter = self.range_iterator(range).await?;
        self.drain(iter).await
    }

    async fn drain(&self, mut iter: MergeIterator) -> Result<Vec<(Bytes, Bytes)>, MountError> {
        let mut entries = Vec::new();
        let drained = loop {
            match iter.next().await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => break Ok(()),
                Err(error) => break Err(error),
            }
        };
        let ended = iter.end().await;

        match (drained, ended) {
            (Ok(()), Ok(())) => Ok(entries),
            (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
            (Err(error), Err(end_error)) => {
                warn!(store = %self.config.name, error = %end_error, "failed to end iterator after read error");
                Err(error)
            }
        }
    }

    /// Forwards the change events of every mount to `observer`, with keys
    /// rewritten into the global key space.
    ///
    /// Returns `true` if at least one mount's store emits changes.
    pub fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> bool {
        let mut accepted = false;
        for mount in self.table.mounts() {
            let prefixed = Arc::new(PrefixedObserver::new(mount.prefix().clone(), observer.clone()));
            if mount.store().subscribe(prefixed) {
                accepted = true;
            } else {
                debug!(store = %self.config.name, mount = ?mount.prefix(), "mount emits no changes");
            }
        }
        accepted
    }
}

/// Lets a composite store be mounted inside another one. `open` ignores the
/// outer options: every mount carries its own.
#[async_trait]
impl KvStore for MountStore {
    async fn open(&self, _options: &OpenOptions) -> anyhow::Result<()> {
        MountStore::open(self).await.map_err(MountError::into_anyhow)
    }

    async fn close(&self) -> anyhow::Result<()> {
        MountStore::close(self).await.map_err(MountError::into_anyhow)
    }

    async fn get(&self, key: &Bytes, options: &ReadOptions) -> anyhow::Result<Option<Bytes>> {
        MountStore::get(self, key.clone(), options)
            .await
            .map_err(MountError::into_anyhow)
    }

    async fn put(&self, key: Bytes, value: Bytes, options: &WriteOptions) -> anyhow::Result<()> {
        MountStore::put(self, key, value, options)
            .await
            .map_err(MountError::into_anyhow)
    }

    async fn del(&self, key: Bytes, options: &WriteOptions) -> anyhow::Result<()> {
        MountStore::del(self, key, options)
            .await
            .map_err(MountError::into_anyhow)
    }

    async fn batch(&self, ops: Vec<BatchOp>, options: &WriteOptions) -> anyhow::Result<()> {
        MountStore::batch(self, ops, options)
            .await
            .map_err(MountError::into_anyhow)
    }

    async fn iterator(&self, range: KeyRange) -> anyhow::Result<Box<dyn KvIterator>> {
        let merge = self
            .range_iterator(range)
            .await
            .map_err(MountError::into_anyhow)?;
        Ok(Box::new(merge))
    }

    fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> bool {
        MountStore::subscribe(self, observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::tests::{Event, RecordingObserver};
    use crate::engines::MemoryStore;

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    fn store_with(mounts: &[&'static str]) -> MountStore {
        let specs = mounts
            .iter()
            .map(|prefix| MountSpec::new(*prefix, Arc::new(MemoryStore::new())))
            .collect();
        MountStore::from_specs(Arc::new(MemoryStore::new()), specs, MountStoreConfig::default())
            .unwrap()
    }

    #[tokio::test]
    async fn writes_land_in_the_owning_mount_under_local_keys() {
        let root = Arc::new(MemoryStore::new());
        let mounted = Arc::new(MemoryStore::new());
        let table = MountTable::builder(root.clone())
            .mount("!mount!", mounted.clone())
            .build()
            .unwrap();
        let store = MountStore::new(table);
        store.open().await.unwrap();

        let write = WriteOptions::default();
        store.put("!mount!ee", "ff", &write).await.unwrap();
        store.put("aa", "bb", &write).await.unwrap();

        assert_eq!(mounted.snapshot(), vec![(b("ee"), b("ff"))]);
        assert_eq!(root.snapshot(), vec![(b("aa"), b("bb"))]);
        assert_eq!(
            store.get("!mount!ee", &ReadOptions::default()).await.unwrap(),
            Some(b("ff"))
        );
    }

    #[tokio::test]
    async fn open_uses_each_mount_options() {
        let root = Arc::new(MemoryStore::new());
        let strict = Arc::new(MemoryStore::new());
        let table = MountTable::builder(root.clone())
            .mount_with_options(
                "!strict!",
                strict.clone(),
                OpenOptions {
                    create_if_missing: false,
                    ..OpenOptions::default()
                },
            )
            .build()
            .unwrap();
        let store = MountStore::new(table);

        let err = store.open().await.unwrap_err();
        assert!(matches!(err, MountError::Backend(_)));
        // The failing mount does not keep the others from opening.
        assert!(root.is_open());
        assert!(!strict.is_open());

        store.close().await.unwrap();
        assert!(!root.is_open());
    }

    #[tokio::test]
    async fn empty_batch_touches_no_mount() {
        let store = store_with(&["!m!"]);
        store.batch(Vec::new(), &WriteOptions::default()).await.unwrap();
        assert!(store.scan(&RangeOptions::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_rejects_conflicting_bounds() {
        let store = store_with(&["!m!"]);
        let err = store
            .scan(&RangeOptions::new().gt("a").gte("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn subscribe_remaps_mount_events_to_global_keys() {
        let store = store_with(&["!mount!"]);
        let recorder = Arc::new(RecordingObserver::default());
        assert!(store.subscribe(recorder.clone()));

        let write = WriteOptions::default();
        store.put("!mount!ee", "ff", &write).await.unwrap();
        store.del("aa", &write).await.unwrap();
        store
            .batch(vec![BatchOp::put("!mount!x", "1"), BatchOp::del("!mount!y")], &write)
            .await
            .unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                Event::Put(b("!mount!ee"), b("ff")),
                Event::Del(b("aa")),
                Event::Batch(vec![BatchOp::put("!mount!x", "1"), BatchOp::del("!mount!y")]),
            ]
        );
    }

    #[tokio::test]
    async fn composite_stores_nest() {
        let inner = Arc::new(store_with(&["!deep!"]));
        let table = MountTable::builder(Arc::new(MemoryStore::new()))
            .mount("!inner!", inner.clone())
            .build()
            .unwrap();
        let outer = MountStore::new(table);
        outer.open().await.unwrap();

        let write = WriteOptions::default();
        outer.put("!inner!!deep!k", "v", &write).await.unwrap();
        outer.put("!inner!a", "w", &write).await.unwrap();
        outer.put("z", "x", &write).await.unwrap();

        assert_eq!(
            inner.get("!deep!k", &ReadOptions::default()).await.unwrap(),
            Some(b("v"))
        );
        let keys: Vec<Bytes> = outer
            .scan(&RangeOptions::new())
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b("!inner!!deep!k"), b("!inner!a"), b("z")]);

        let keys: Vec<Bytes> = outer
            .scan(&RangeOptions::new().gte("!inner!!deep!").reverse())
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b("z"), b("!inner!a"), b("!inner!!deep!k")]);
    }
}

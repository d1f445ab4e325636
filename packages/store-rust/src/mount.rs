//! Mount table: prefix registration and key resolution.
//!
//! A [`MountTable`] is immutable once built. Mounts are kept in one array
//! sorted by descending prefix length and grouped by length; resolving a
//! key binary-searches each length group from the longest down, so the
//! first hit is the longest matching prefix. The root mount (empty
//! prefix) forms the last group and matches every key.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use mountkv_core::{BatchOp, KeyRange};
use tracing::debug;

use crate::config::OpenOptions;
use crate::error::MountError;
use crate::traits::KvStore;
use crate::translate::translate;

/// Construction record for a prefixed mount.
pub struct MountSpec {
    pub prefix: Bytes,
    pub store: Arc<dyn KvStore>,
    pub options: OpenOptions,
}

impl MountSpec {
    /// Creates a spec opened with default [`OpenOptions`].
    #[must_use]
    pub fn new(prefix: impl Into<Bytes>, store: Arc<dyn KvStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
            options: OpenOptions::default(),
        }
    }

    /// Replaces the options the store is opened with.
    #[must_use]
    pub fn with_options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }
}

/// A registered `(prefix, store)` pair.
pub struct Mount {
    prefix: Bytes,
    store: Arc<dyn KvStore>,
    options: OpenOptions,
    ordinal: usize,
}

impl Mount {
    /// Leading bytes every key routed here starts with; empty for the root.
    #[must_use]
    pub fn prefix(&self) -> &Bytes {
        &self.prefix
    }

    /// The backing store, addressed by local keys.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Options the store is opened with.
    #[must_use]
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Registration order; the root mount is 0.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Whether this is the fallback mount.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.prefix.is_empty()
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix)
            .field("ordinal", &self.ordinal)
            .finish_non_exhaustive()
    }
}

/// A key resolved to its owning mount.
#[derive(Debug)]
pub struct ResolvedKey<'a> {
    pub mount: &'a Mount,
    /// The key with the mount's prefix removed.
    pub local_key: Bytes,
}

/// Registers mounts before a [`MountTable`] is built.
pub struct MountTableBuilder {
    root: Arc<dyn KvStore>,
    root_options: OpenOptions,
    mounts: Vec<MountSpec>,
}

impl MountTableBuilder {
    /// Sets the options the root store is opened with.
    #[must_use]
    pub fn root_options(mut self, options: OpenOptions) -> Self {
        self.root_options = options;
        self
    }

    /// Routes every key starting with `prefix` to `store`.
    #[must_use]
    pub fn mount(self, prefix: impl Into<Bytes>, store: Arc<dyn KvStore>) -> Self {
        self.mount_spec(MountSpec::new(prefix, store))
    }

    /// Like [`mount`](Self::mount), with explicit open options.
    #[must_use]
    pub fn mount_with_options(
        self,
        prefix: impl Into<Bytes>,
        store: Arc<dyn KvStore>,
        options: OpenOptions,
    ) -> Self {
        self.mount_spec(MountSpec::new(prefix, store).with_options(options))
    }

    /// Registers a prepared [`MountSpec`].
    #[must_use]
    pub fn mount_spec(mut self, spec: MountSpec) -> Self {
        self.mounts.push(spec);
        self
    }

    /// Builds the immutable table.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::EmptyPrefix`] if a mount other than the root uses
    /// the empty prefix, and [`MountError::DuplicatePrefix`] if a prefix is
    /// registered twice.
    pub fn build(self) -> Result<MountTable, MountError> {
        let mut mounts = Vec::with_capacity(self.mounts.len() + 1);
        mounts.push(Mount {
            prefix: Bytes::new(),
            store: self.root,
            options: self.root_options,
            ordinal: 0,
        });

        let mut seen = HashSet::new();
        for (index, spec) in self.mounts.into_iter().enumerate() {
            if spec.prefix.is_empty() {
                return Err(MountError::EmptyPrefix);
            }
            if !seen.insert(spec.prefix.clone()) {
                return Err(MountError::DuplicatePrefix {
                    prefix: spec.prefix,
                });
            }
            mounts.push(Mount {
                prefix: spec.prefix,
                store: spec.store,
                options: spec.options,
                ordinal: index + 1,
            });
        }

        mounts.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        let mut groups: Vec<(usize, Range<usize>)> = Vec::new();
        for (index, mount) in mounts.iter().enumerate() {
            match groups.last_mut() {
                Some((len, span)) if *len == mount.prefix.len() => span.end = index + 1,
                _ => groups.push((mount.prefix.len(), index..index + 1)),
            }
        }

        debug!(mounts = mounts.len(), lengths = groups.len(), "mount table built");
        Ok(MountTable { mounts, groups })
    }
}

/// Immutable set of mounts with longest-prefix resolution.
pub struct MountTable {
    /// Sorted by descending prefix length, then ascending prefix bytes.
    mounts: Vec<Mount>,
    /// `(prefix length, span of mounts)`, longest first.
    groups: Vec<(usize, Range<usize>)>,
}

impl MountTable {
    /// Starts a table whose fallback mount is `root`.
    #[must_use]
    pub fn builder(root: Arc<dyn KvStore>) -> MountTableBuilder {
        MountTableBuilder {
            root,
            root_options: OpenOptions::default(),
            mounts: Vec::new(),
        }
    }

    /// Builds a table from a root store and a list of prefixed mounts.
    ///
    /// # Errors
    ///
    /// See [`MountTableBuilder::build`].
    pub fn new(root: Arc<dyn KvStore>, mounts: Vec<MountSpec>) -> Result<Self, MountError> {
        mounts
            .into_iter()
            .fold(Self::builder(root), MountTableBuilder::mount_spec)
            .build()
    }

    /// Finds the mount with the longest prefix of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::ResolutionInvariantViolation`] if nothing
    /// matches, which cannot happen for a table built with a root mount.
    pub fn resolve(&self, key: &Bytes) -> Result<ResolvedKey<'_>, MountError> {
        for (len, span) in &self.groups {
            if *len > key.len() {
                continue;
            }
            let head = &key[..*len];
            let group = &self.mounts[span.clone()];
            if let Ok(found) = group.binary_search_by(|m| m.prefix[..].cmp(head)) {
                return Ok(ResolvedKey {
                    mount: &group[found],
                    local_key: key.slice(*len..),
                });
            }
        }
        Err(MountError::ResolutionInvariantViolation { key: key.clone() })
    }

    /// Splits a batch into per-mount sub-batches addressed by local key.
    ///
    /// Sub-batches are returned in order of their mount's first appearance;
    /// each keeps the relative order of its operations.
    ///
    /// # Errors
    ///
    /// Propagates [`MountTable::resolve`] failures.
    pub fn group_by_mount(
        &self,
        ops: Vec<BatchOp>,
    ) -> Result<Vec<(&Mount, Vec<BatchOp>)>, MountError> {
        let mut grouped: Vec<(&Mount, Vec<BatchOp>)> = Vec::new();
        for op in ops {
            let resolved = self.resolve(op.key())?;
            let local = op.with_key(resolved.local_key);
            match grouped
                .iter_mut()
                .find(|(mount, _)| mount.ordinal == resolved.mount.ordinal)
            {
                Some((_, sub_batch)) => sub_batch.push(local),
                None => grouped.push((resolved.mount, vec![local])),
            }
        }
        Ok(grouped)
    }

    /// Returns every mount that can contribute to `range`, paired with the
    /// range in that mount's local coordinates.
    #[must_use]
    pub fn candidates(&self, range: &KeyRange) -> Vec<(&Mount, KeyRange)> {
        self.mounts
            .iter()
            .filter_map(|mount| {
                translate(range, &mount.prefix)
                    .into_key_range(range.reverse)
                    .map(|local| (mount, local))
            })
            .collect()
    }

    /// Every mount, longest prefix first.
    pub fn mounts(&self) -> std::slice::Iter<'_, Mount> {
        self.mounts.iter()
    }

    /// The fallback mount with the empty prefix.
    #[must_use]
    pub fn root(&self) -> &Mount {
        // The root group is always last: its prefix length is 0.
        &self.mounts[self.mounts.len() - 1]
    }
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.mounts.iter()).finish()
    }
}

//! K-way merge of per-mount iterators into one globally ordered stream.
//!
//! Each candidate mount contributes one local iterator. The head entry of
//! every live iterator sits in a binary heap keyed by its reconstructed
//! global key, so `next` is one pop plus one refill of the popped source.
//! Mount prefixes partition the key space, which makes the per-source
//! streams disjoint; a key produced by two mounts is an invariant violation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use mountkv_core::key::join;
use mountkv_core::{Direction, KeyRange};
use tracing::{debug, debug_span, warn, Instrument, Span};

use crate::config::MountStoreConfig;
use crate::error::MountError;
use crate::fanout::settle_all;
use crate::mount::MountTable;
use crate::traits::KvIterator;

/// One mount's local iterator.
struct Source {
    prefix: Bytes,
    ordinal: usize,
    iterator: Box<dyn KvIterator>,
}

/// Head entry of a source, keyed by its global key.
struct HeapEntry {
    key: Bytes,
    value: Bytes,
    source: usize,
    ordinal: usize,
    direction: Direction,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest entry; reverse so the entry produced
        // first in the iteration direction is on top.
        self.direction
            .order(&self.key, &other.key)
            .then_with(|| self.ordinal.cmp(&other.ordinal))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Exhausted,
    Ended,
}

/// Globally ordered iterator over every mount of a [`MountTable`].
///
/// Must be released with [`MergeIterator::end`], which ends every local
/// iterator exactly once. `next` calls must not overlap.
pub struct MergeIterator {
    sources: Vec<Source>,
    heap: BinaryHeap<HeapEntry>,
    range: KeyRange,
    direction: Direction,
    verify_bounds: bool,
    emitted: usize,
    /// Source of the last popped entry; pulled again on the next call.
    refill: Option<usize>,
    state: State,
    span: Span,
}

impl fmt::Debug for MergeIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeIterator")
            .field("sources", &self.sources.len())
            .field("state", &self.state)
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}

impl MergeIterator {
    /// Opens a local iterator on every mount that can contribute to `range`
    /// and primes the heap with their first entries.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Backend`] if a local iterator fails to open or
    /// to produce its first entry. Every iterator that did open has been
    /// ended by then.
    pub async fn open(
        table: &MountTable,
        range: KeyRange,
        config: &MountStoreConfig,
    ) -> Result<Self, MountError> {
        let span = debug_span!("merge", store = %config.name, reverse = range.reverse);
        let mut merge = Self {
            sources: Vec::new(),
            heap: BinaryHeap::new(),
            direction: range.direction(),
            verify_bounds: config.verify_merged_bounds,
            emitted: 0,
            refill: None,
            state: State::Ready,
            span: span.clone(),
            range,
        };

        if merge.range.limit == Some(0) || merge.range.is_empty() {
            merge.state = State::Exhausted;
            return Ok(merge);
        }

        let candidates = table.candidates(&merge.range);
        let opened = join_all(candidates.into_iter().map(|(mount, local)| async move {
            let result = mount.store().iterator(local).await;
            (mount, result)
        }))
        .instrument(span.clone())
        .await;

        let mut first_error = None;
        for (mount, result) in opened {
            match result {
                Ok(iterator) => merge.sources.push(Source {
                    prefix: mount.prefix().clone(),
                    ordinal: mount.ordinal(),
                    iterator,
                }),
                Err(error) if first_error.is_none() => first_error = Some(error),
                Err(error) => {
                    warn!(parent: &span, mount = ?mount.prefix(), error = %error, "suppressed secondary failure");
                }
            }
        }

        let primed = match first_error {
            Some(error) => Err(MountError::Backend(error)),
            None => merge.prime().instrument(span.clone()).await,
        };
        if let Err(error) = primed {
            merge.abort().await;
            return Err(error);
        }

        debug!(parent: &span, sources = merge.sources.len(), "merge opened");
        Ok(merge)
    }

    /// Number of local iterators this merge owns.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Returns the next entry in global order, or `None` once the range or
    /// the limit is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::IteratorEnded`] after [`end`](Self::end),
    /// [`MountError::DuplicateKey`] if two mounts produce the same global
    /// key, and [`MountError::Backend`] if a local iterator fails. After an
    /// error the iterator should still be ended.
    pub async fn next(&mut self) -> Result<Option<(Bytes, Bytes)>, MountError> {
        match self.state {
            State::Ended => return Err(MountError::IteratorEnded),
            State::Exhausted => return Ok(None),
            State::Ready => {}
        }
        let span = self.span.clone();
        self.advance().instrument(span).await
    }

    /// Ends every local iterator, whether or not it was exhausted.
    ///
    /// All of them are ended concurrently and awaited even if some fail.
    /// The merge is ended afterwards regardless of the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::IteratorEnded`] if called twice and
    /// [`MountError::IteratorClose`] carrying the first observed failure if
    /// any local iterator failed to end.
    pub async fn end(&mut self) -> Result<(), MountError> {
        if self.state == State::Ended {
            return Err(MountError::IteratorEnded);
        }
        let span = self.span.clone();
        let total = self.sources.len();
        let failures = self.end_sources().instrument(span.clone()).await;

        let count = failures.len();
        let mut failures = failures.into_iter();
        let Some((_, source)) = failures.next() else {
            debug!(parent: &span, sources = total, emitted = self.emitted, "merge ended");
            return Ok(());
        };
        for (prefix, error) in failures {
            warn!(parent: &span, mount = ?prefix, error = %error, "failed to end mount iterator");
        }
        Err(MountError::IteratorClose {
            failures: count,
            total,
            source,
        })
    }

    async fn advance(&mut self) -> Result<Option<(Bytes, Bytes)>, MountError> {
        loop {
            if self.range.limit.is_some_and(|limit| self.emitted >= limit) {
                return Ok(self.exhaust());
            }
            if let Some(index) = self.refill {
                self.pull(index).await?;
                self.refill = None;
            }

            let Some(entry) = self.heap.pop() else {
                return Ok(self.exhaust());
            };
            if let Some(top) = self.heap.peek() {
                if top.key == entry.key {
                    return Err(MountError::DuplicateKey {
                        key: entry.key,
                        first: self.sources[entry.source].prefix.clone(),
                        second: self.sources[top.source].prefix.clone(),
                    });
                }
            }
            self.refill = Some(entry.source);

            if self.verify_bounds && !self.range.contains(&entry.key) {
                debug!(key = ?entry.key, "merged key outside range skipped");
                continue;
            }
            self.emitted += 1;
            return Ok(Some((entry.key, entry.value)));
        }
    }

    async fn prime(&mut self) -> Result<(), MountError> {
        let pulled = join_all(
            self.sources
                .iter_mut()
                .enumerate()
                .map(|(index, source)| async move { (index, source.iterator.next().await) }),
        )
        .await;

        for (index, result) in pulled {
            if let Some((local, value)) = result? {
                self.push(index, &local, value);
            }
        }
        Ok(())
    }

    async fn pull(&mut self, index: usize) -> Result<(), MountError> {
        if let Some((local, value)) = self.sources[index].iterator.next().await? {
            self.push(index, &local, value);
        }
        Ok(())
    }

    fn push(&mut self, index: usize, local: &[u8], value: Bytes) {
        let source = &self.sources[index];
        self.heap.push(HeapEntry {
            key: join(&source.prefix, local),
            value,
            source: index,
            ordinal: source.ordinal,
            direction: self.direction,
        });
    }

    fn exhaust(&mut self) -> Option<(Bytes, Bytes)> {
        if self.state == State::Ready {
            debug!(emitted = self.emitted, "merge exhausted");
        }
        self.state = State::Exhausted;
        self.heap.clear();
        None
    }

    async fn end_sources(&mut self) -> Vec<(Bytes, anyhow::Error)> {
        self.state = State::Ended;
        self.heap.clear();
        self.refill = None;
        settle_all(
            self.sources
                .iter_mut()
                .map(|source| (source.prefix.clone(), source.iterator.end())),
        )
        .await
    }

    /// Ends every opened source after a failed open, logging failures.
    async fn abort(&mut self) {
        let span = self.span.clone();
        for (prefix, error) in self.end_sources().instrument(span.clone()).await {
            warn!(parent: &span, mount = ?prefix, error = %error, "failed to end mount iterator");
        }
    }
}

impl Drop for MergeIterator {
    fn drop(&mut self) {
        if self.state != State::Ended && !self.sources.is_empty() {
            warn!(parent: &self.span, sources = self.sources.len(), "merge iterator dropped without end()");
        }
    }
}

#[async_trait]
impl KvIterator for MergeIterator {
    async fn next(&mut self) -> anyhow::Result<Option<(Bytes, Bytes)>> {
        MergeIterator::next(self).await.map_err(MountError::into_anyhow)
    }

    async fn end(&mut self) -> anyhow::Result<()> {
        MergeIterator::end(self).await.map_err(MountError::into_anyhow)
    }
}

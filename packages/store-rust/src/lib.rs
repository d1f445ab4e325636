//! `mountkv`: one ordered key-value store composed from prefix-routed mounts.

pub mod changes;
pub mod config;
pub mod engines;
pub mod error;
mod fanout;
pub mod merge;
pub mod mount;
pub mod store;
pub mod traits;
pub mod translate;

pub use changes::{ChangeObserver, CompositeChangeObserver, PrefixedObserver};
pub use config::{MountStoreConfig, OpenOptions};
pub use engines::MemoryStore;
pub use error::{MountError, MountFailure};
pub use merge::MergeIterator;
pub use mount::{Mount, MountSpec, MountTable, MountTableBuilder, ResolvedKey};
pub use mountkv_core::{BatchOp, Direction, KeyRange, RangeError, RangeOptions};
pub use store::MountStore;
pub use traits::{KvIterator, KvStore, ReadOptions, WriteOptions};
pub use translate::{translate, LocalRange};

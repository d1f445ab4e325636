//! Backing store implementations shipped with the crate.

mod memory;

pub use memory::MemoryStore;

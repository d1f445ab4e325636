//! `mountkv` core: byte-key ordering, range normalization and batch operations.
//!
//! Shared by the composite store and by every backing store implementation.

pub mod batch;
pub mod key;
pub mod range;

pub use batch::BatchOp;
pub use key::Direction;
pub use range::{KeyRange, RangeError, RangeOptions};

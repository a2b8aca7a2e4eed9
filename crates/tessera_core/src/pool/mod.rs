//! Chunked slot storage
//!
//! Values live in fixed-size chunks and are addressed by a stable
//! [`ComponentIndex`]. Freed slots are threaded into an intrusive free list
//! and handed out again by the next `emplace`.

mod chunk;
mod pool;

pub use pool::{Iter, IterMut, Pool};

use thiserror::Error;

/// Opaque address of a value inside a [`Pool`].
pub type ComponentIndex = u32;

/// Default number of slots per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("index {index} is out of bounds (pool has {slots} slots)")]
    IndexOutOfBounds { index: ComponentIndex, slots: usize },
    #[error("index {index} refers to a freed slot")]
    FreedSlot { index: ComponentIndex },
}

//! The buffer cache: one in-memory copy of each recently used device block.
//!
//! Lookup goes through a chained hash keyed by (device, block, size);
//! replacement takes the least recently used descriptor off a circular free
//! list. Dirty buffers additionally sit on a dirty list until a sync or an
//! eviction writes them out. Every descriptor is on the free list except
//! while a task holds it locked, so "allocated" and "locked" are the same
//! state transition.

#![no_std]

extern crate alloc;

mod buffer;
mod cache;

pub use buffer::{BlockKey, BufferFlags};
pub use cache::{BufGuard, BufferCache, BufferStats};

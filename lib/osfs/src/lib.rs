//! A minimal filesystem over the generic cache layers.
//!
//! One flat set of regular files on one block device, with a direct block
//! table per inode and a bump block allocator: just enough filesystem to
//! exercise the read and write paths end to end. Reads go through the page
//! cache, writes through the buffer cache, exactly as any richer filesystem
//! built on the same layers would.

#![no_std]

extern crate alloc;

pub mod file;
pub mod fs;
pub mod inode;

pub use file::SimpleFile;
pub use fs::SimpleFs;
pub use inode::SimpleInode;

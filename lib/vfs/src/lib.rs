#![no_std]

extern crate alloc;

pub mod file;
pub mod inode;
pub mod superblock;

pub use file::FileMeta;
pub use inode::Inode;
pub use superblock::SuperBlock;

#![no_std]

pub mod frame;
pub mod page_cache;

extern crate alloc;

//! Module for managing page-sized frames of memory.
//!
//! A [`FrameTracker`] owns one page worth of storage for the lifetime of the
//! tracker; dropping it returns the memory to the allocator. Allocation is
//! fallible and reports exhaustion as `ENOMEM` instead of aborting, because
//! running out of frames is an ordinary condition the caches recover from.
//!
//! A tracker hands out its contents through `&self`, so several holders can
//! reach the same frame. It provides no synchronization of its own: the
//! owner is responsible for serializing access, which the caches do with
//! their per-page and per-buffer lock bits.

use alloc::vec::Vec;
use core::cell::UnsafeCell;

use config::mm::PAGE_SIZE;
use systype::{SysError, SysResult};

pub struct FrameTracker {
    data: UnsafeCell<Vec<u8>>,
}

// Shared access is serialized by the caches' lock bits.
unsafe impl Send for FrameTracker {}
unsafe impl Sync for FrameTracker {}

impl FrameTracker {
    /// Allocates a zeroed frame.
    ///
    /// # Errors
    /// Returns an `ENOMEM` error if the allocation fails.
    pub fn build() -> SysResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(PAGE_SIZE)
            .map_err(|_| SysError::ENOMEM)?;
        data.resize(PAGE_SIZE, 0);
        Ok(Self {
            data: UnsafeCell::new(data),
        })
    }

    /// Returns the frame contents.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { (*self.data.get()).as_slice() }
    }

    /// Returns the frame contents for writing.
    #[allow(clippy::mut_from_ref)]
    pub fn as_mut_slice(&self) -> &mut [u8] {
        unsafe { (*self.data.get()).as_mut_slice() }
    }
}

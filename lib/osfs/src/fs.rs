use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use config::device::DevId;
use systype::kinterface::TaskOps;
use vfs::SuperBlock;

use crate::inode::SimpleInode;

/// A mounted instance of the filesystem: the superblock plus the two bump
/// allocators behind it. Block 0 is never handed out — it is the hole
/// marker in the block tables.
pub struct SimpleFs {
    pub superblock: Arc<SuperBlock>,
    nblocks: usize,
    next_ino: AtomicUsize,
    next_block: AtomicUsize,
    pub(crate) sched: Arc<dyn TaskOps>,
}

impl SimpleFs {
    /// Mounts a filesystem of `nblocks` blocks on `device`.
    pub fn new(
        device: DevId,
        block_size: usize,
        nblocks: usize,
        sched: Arc<dyn TaskOps>,
    ) -> Arc<Self> {
        Arc::new(Self {
            superblock: SuperBlock::new(device, block_size),
            nblocks,
            next_ino: AtomicUsize::new(1),
            next_block: AtomicUsize::new(1),
            sched,
        })
    }

    /// Creates an empty regular file.
    pub fn create(self: &Arc<Self>) -> Arc<SimpleInode> {
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        Arc::new(SimpleInode::new(ino, self.clone()))
    }

    /// Hands out the next unused block, or `None` when the device is full.
    pub(crate) fn alloc_block(&self) -> Option<usize> {
        let block = self.next_block.fetch_add(1, Ordering::Relaxed);
        if block < self.nblocks {
            Some(block)
        } else {
            log::warn!("[SimpleFs::alloc_block] device full ({} blocks)", self.nblocks);
            None
        }
    }
}

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bcache::BufferCache;
use config::{device::DevId, vfs::BmapMode};
use downcast_rs::{impl_downcast, DowncastSync};
use mm::page_cache::PageCache;
use mutex::SpinNoIrqLock;
use systype::{
    kinterface::{TaskOps, WaitChannel},
    time::TimeSpec,
    SysError, SysResult, SyscallResult,
};

use crate::{file::FileMeta, superblock::SuperBlock};

#[derive(Debug, Default, Clone, Copy)]
pub struct InodeTimes {
    pub mtime: TimeSpec,
    pub ctime: TimeSpec,
}

pub struct InodeMeta {
    pub ino: usize,
    pub superblock: Arc<SuperBlock>,

    pub size: AtomicUsize,
    pub times: SpinNoIrqLock<InodeTimes>,
    pub dirty: AtomicBool,
    /// Inode-level lock; held across whole read and write operations, so it
    /// is a sleeping lock, not a spinning one.
    locked: SpinNoIrqLock<bool>,

    pub sched: Arc<dyn TaskOps>,
}

impl InodeMeta {
    pub fn new(ino: usize, superblock: Arc<SuperBlock>, sched: Arc<dyn TaskOps>) -> Self {
        Self {
            ino,
            superblock,
            size: AtomicUsize::new(0),
            times: SpinNoIrqLock::new(InodeTimes::default()),
            dirty: AtomicBool::new(false),
            locked: SpinNoIrqLock::new(false),
            sched,
        }
    }
}

pub trait Inode: Send + Sync + DowncastSync {
    fn get_meta(&self) -> &InodeMeta;

    /// Maps byte `offset` of the file to a device block number.
    ///
    /// Mapping [`BmapMode::ForWriting`] may allocate a block;
    /// [`BmapMode::ForReading`] returns 0 where no block backs the offset —
    /// a hole, which reads as zeros.
    fn bmap(&self, offset: usize, mode: BmapMode) -> SysResult<usize>;

    /// The filesystem's write path, used by [`crate::file::write_page`] to
    /// push page contents back through the block layer. Filesystems without
    /// one keep the default.
    fn write(
        &self,
        _pages: &PageCache,
        _buffers: &BufferCache,
        _file: &FileMeta,
        _buf: &[u8],
    ) -> SyscallResult {
        Err(SysError::EINVAL)
    }
}

impl dyn Inode {
    pub fn ino(&self) -> usize {
        self.get_meta().ino
    }

    pub fn dev(&self) -> DevId {
        self.get_meta().superblock.device
    }

    pub fn block_size(&self) -> usize {
        self.get_meta().superblock.block_size
    }

    pub fn size(&self) -> usize {
        self.get_meta().size.load(Ordering::Relaxed)
    }

    pub fn set_size(&self, size: usize) {
        self.get_meta().size.store(size, Ordering::Relaxed);
    }

    pub fn times(&self) -> InodeTimes {
        *self.get_meta().times.lock()
    }

    /// Stamps both mtime and ctime.
    pub fn set_times(&self, time: TimeSpec) {
        let mut times = self.get_meta().times.lock();
        times.mtime = time;
        times.ctime = time;
    }

    pub fn is_dirty(&self) -> bool {
        self.get_meta().dirty.load(Ordering::Relaxed)
    }

    pub fn mark_dirty(&self) {
        self.get_meta().dirty.store(true, Ordering::Relaxed);
    }

    /// Acquires the inode lock, sleeping while another task holds it.
    pub fn lock(&self) {
        let meta = self.get_meta();
        loop {
            let mut locked = meta.locked.lock();
            if *locked {
                drop(locked);
                meta.sched.sleep(WaitChannel::Inode(meta.ino));
            } else {
                *locked = true;
                return;
            }
        }
    }

    /// Releases the inode lock and wakes its waiters.
    pub fn unlock(&self) {
        let meta = self.get_meta();
        *meta.locked.lock() = false;
        meta.sched.wakeup(WaitChannel::Inode(meta.ino));
    }
}

impl_downcast!(sync Inode);

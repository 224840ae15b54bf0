use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::Ordering;

use bcache::BufferCache;
use config::vfs::BmapMode;
use mm::page_cache::PageCache;
use mutex::SpinNoIrqLock;
use systype::{SysError, SysResult, SyscallResult};
use vfs::{
    file::{self, FileMeta},
    inode::{Inode, InodeMeta},
};

use crate::fs::SimpleFs;

/// A regular file, mapped by a direct block table: entry `n` holds the
/// device block backing file block `n`, with 0 for a hole.
pub struct SimpleInode {
    meta: InodeMeta,
    fs: Arc<SimpleFs>,
    blocks: SpinNoIrqLock<Vec<usize>>,
}

impl SimpleInode {
    pub(crate) fn new(ino: usize, fs: Arc<SimpleFs>) -> Self {
        Self {
            meta: InodeMeta::new(ino, fs.superblock.clone(), fs.sched.clone()),
            fs,
            blocks: SpinNoIrqLock::new(Vec::new()),
        }
    }

    /// Drops the file contents: size zero, every mapping gone. The blocks
    /// themselves go back to nobody — the bump allocator does not recycle.
    pub fn truncate(&self) {
        self.blocks.lock().clear();
        self.meta.size.store(0, Ordering::Relaxed);
    }
}

impl Inode for SimpleInode {
    fn get_meta(&self) -> &InodeMeta {
        &self.meta
    }

    fn bmap(&self, offset: usize, mode: BmapMode) -> SysResult<usize> {
        let index = offset / self.meta.superblock.block_size;
        match mode {
            BmapMode::ForReading => Ok(self.blocks.lock().get(index).copied().unwrap_or(0)),
            BmapMode::ForWriting => {
                let mut blocks = self.blocks.lock();
                if blocks.len() <= index {
                    blocks.resize(index + 1, 0);
                }
                if blocks[index] == 0 {
                    blocks[index] = self.fs.alloc_block().ok_or(SysError::ENOSPC)?;
                }
                Ok(blocks[index])
            }
        }
    }

    fn write(
        &self,
        pages: &PageCache,
        buffers: &BufferCache,
        file: &FileMeta,
        buf: &[u8],
    ) -> SyscallResult {
        file::file_write(pages, buffers, file, buf)
    }
}

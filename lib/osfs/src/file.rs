use alloc::sync::Arc;

use bcache::BufferCache;
use config::vfs::{OpenFlags, SeekFrom};
use mm::page_cache::PageCache;
use systype::{SysError, SysResult, SyscallResult};
use vfs::file::{self, FileMeta};

use crate::inode::SimpleInode;

/// An open regular file: an inode plus a position and the open flags.
pub struct SimpleFile {
    meta: FileMeta,
}

impl SimpleFile {
    /// Opens `inode`. `O_APPEND` starts the position at the end of the
    /// file; `O_TRUNC` drops the current contents.
    pub fn open(inode: Arc<SimpleInode>, flags: OpenFlags) -> Self {
        let file = Self {
            meta: FileMeta::new(inode.clone(), flags),
        };
        if flags.contains(OpenFlags::O_APPEND) {
            file.meta.set_pos(file.meta.inode.size());
        }
        if flags.contains(OpenFlags::O_TRUNC) {
            inode.truncate();
        }
        file
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn pos(&self) -> usize {
        self.meta.pos()
    }

    pub fn close(&self) -> SysResult<()> {
        Ok(())
    }

    /// Moves the file position. Seeking before the start of the file is
    /// invalid; seeking past the end is not — a later write there leaves a
    /// hole.
    pub fn lseek(&self, pos: SeekFrom) -> SyscallResult {
        let mut res_pos = self.meta.pos();
        match pos {
            SeekFrom::Current(off) => {
                if off < 0 {
                    res_pos = res_pos
                        .checked_sub(off.unsigned_abs())
                        .ok_or(SysError::EINVAL)?;
                } else {
                    res_pos += off as usize;
                }
            }
            SeekFrom::Start(off) => {
                res_pos = off;
            }
            SeekFrom::End(off) => {
                let size = self.meta.inode.size();
                if off < 0 {
                    res_pos = size
                        .checked_sub(off.unsigned_abs())
                        .ok_or(SysError::EINVAL)?;
                } else {
                    res_pos = size + off as usize;
                }
            }
        }
        self.meta.set_pos(res_pos);
        Ok(res_pos)
    }

    /// Reads at the file position through the page cache.
    pub fn read(
        &self,
        pages: &PageCache,
        buffers: &BufferCache,
        buf: &mut [u8],
    ) -> SyscallResult {
        file::file_read(pages, buffers, &self.meta, buf)
    }

    /// Writes at the file position through the buffer cache.
    pub fn write(&self, pages: &PageCache, buffers: &BufferCache, buf: &[u8]) -> SyscallResult {
        file::file_write(pages, buffers, &self.meta, buf)
    }
}

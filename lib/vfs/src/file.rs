//! Generic file I/O over the two caches.
//!
//! Reads are served from the page cache: a miss pulls a free page, fills it
//! block by block through the buffer cache, and (for shareable mappings)
//! hashes it for the next reader. Writes go the other way — through the
//! buffer cache — and patch any cached page covering the written range so a
//! read that follows a write sees the new bytes without a sync in between.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use bcache::BufferCache;
use config::{
    mm::{page_base, page_offset, PAGE_SIZE},
    vfs::{BmapMode, OpenFlags},
};
use mm::page_cache::{
    page::{PageId, PageKey},
    PageCache,
};
use mutex::SpinNoIrqLock;
use systype::{
    kinterface::TaskOps,
    memory_flags::{MmapFlags, MmapProt},
    SysError, SysResult, SyscallResult,
};

use crate::inode::Inode;

pub struct FileMeta {
    pub inode: Arc<dyn Inode>,

    pub pos: AtomicUsize,
    pub flags: SpinNoIrqLock<OpenFlags>,
}

impl FileMeta {
    pub fn new(inode: Arc<dyn Inode>, flags: OpenFlags) -> Self {
        Self {
            inode,
            pos: AtomicUsize::new(0),
            flags: SpinNoIrqLock::new(flags),
        }
    }

    pub fn pos(&self) -> usize {
        self.pos.load(Ordering::Relaxed)
    }

    pub fn set_pos(&self, pos: usize) {
        self.pos.store(pos, Ordering::Relaxed)
    }

    pub fn flags(&self) -> OpenFlags {
        *self.flags.lock()
    }

    pub fn set_flags(&self, flags: OpenFlags) {
        *self.flags.lock() = flags;
    }
}

/// Reads from the file position into `buf`, at most up to end of file.
///
/// Returns count of bytes actually read, and advances the position by it.
pub fn file_read(
    pages: &PageCache,
    buffers: &BufferCache,
    file: &FileMeta,
    buf: &mut [u8],
) -> SyscallResult {
    let inode = &file.inode;
    inode.lock();

    if file.pos() > inode.size() {
        file.set_pos(inode.size());
    }

    let mut total = 0;
    loop {
        let pos = file.pos();
        let count = (buf.len() - total).min(inode.size().saturating_sub(pos));
        if count == 0 {
            break;
        }

        let poffset = page_offset(pos);
        let key = PageKey::new(inode.ino(), inode.dev(), page_base(pos));
        let id = match pages.lookup(key) {
            Some(id) => id,
            None => {
                let Some(id) = pages.get_free_page() else {
                    inode.unlock();
                    log::warn!("[file_read] ino {} no free page", inode.ino());
                    return Err(SysError::ENOMEM);
                };
                if read_page(
                    pages,
                    buffers,
                    inode,
                    id,
                    key.offset,
                    MmapProt::PROT_READ,
                    MmapFlags::MAP_SHARED,
                )
                .is_err()
                {
                    pages.release(id);
                    inode.unlock();
                    log::warn!("[file_read] ino {} read error at {}", inode.ino(), pos);
                    return Err(SysError::EIO);
                }
                id
            }
        };

        pages.lock_page(id);
        let bytes = (PAGE_SIZE - poffset).min(count);
        let data = pages.frame(id).as_slice();
        buf[total..total + bytes].copy_from_slice(&data[poffset..poffset + bytes]);
        total += bytes;
        file.set_pos(pos + bytes);
        pages.release(id);
        pages.unlock_page(id);
    }

    inode.unlock();
    Ok(total)
}

/// Writes `buf` at the file position (at end of file when opened with
/// `O_APPEND`), allocating blocks as needed.
///
/// Each fragment lands in the buffer cache and is patched into any cached
/// page covering it, then the buffer is released dirty; nothing reaches the
/// device until a sync. Extending writes grow the size; mtime and ctime are
/// stamped and the inode marked dirty.
pub fn file_write(
    pages: &PageCache,
    buffers: &BufferCache,
    file: &FileMeta,
    buf: &[u8],
) -> SyscallResult {
    let inode = &file.inode;
    inode.lock();

    let blksize = inode.block_size();
    if file.flags().contains(OpenFlags::O_APPEND) {
        file.set_pos(inode.size());
    }

    let mut total = 0;
    while total < buf.len() {
        let pos = file.pos();
        let boffset = pos % blksize;
        let block = match inode.bmap(pos, BmapMode::ForWriting) {
            Ok(block) => block,
            Err(e) => {
                inode.unlock();
                return Err(e);
            }
        };
        let bytes = (blksize - boffset).min(buf.len() - total);

        let Ok(mut guard) = buffers.bread(inode.dev(), block, blksize) else {
            inode.unlock();
            return Err(SysError::EIO);
        };
        guard.data_mut()[boffset..boffset + bytes].copy_from_slice(&buf[total..total + bytes]);
        pages.update(inode.ino(), inode.dev(), pos, &buf[total..total + bytes]);
        guard.bwrite();

        total += bytes;
        file.set_pos(pos + bytes);
    }

    if file.pos() > inode.size() {
        inode.set_size(file.pos());
    }
    inode.set_times(inode.get_meta().sched.now());
    inode.mark_dirty();

    inode.unlock();
    Ok(total)
}

/// Fills page `id` with the file contents at page-aligned `offset`, block
/// by block; offsets `bmap` reports as holes are zero-filled without
/// touching the device.
///
/// The page is hashed — made findable for later reads — only when the
/// mapping cannot diverge from the file: read-only or shared. A private
/// writable mapping gets a one-off copy instead.
pub fn read_page(
    pages: &PageCache,
    buffers: &BufferCache,
    inode: &Arc<dyn Inode>,
    id: PageId,
    offset: usize,
    prot: MmapProt,
    flags: MmapFlags,
) -> SysResult<()> {
    let blksize = inode.block_size();
    debug_assert!(offset % PAGE_SIZE == 0);
    debug_assert!(PAGE_SIZE % blksize == 0);

    let data = pages.frame(id).as_mut_slice();
    let mut done = 0;
    while done < PAGE_SIZE {
        let block = inode.bmap(offset + done, BmapMode::ForReading)?;
        if block != 0 {
            let guard = buffers.bread(inode.dev(), block, blksize)?;
            data[done..done + blksize].copy_from_slice(guard.data());
        } else {
            data[done..done + blksize].fill(0);
        }
        done += blksize;
    }

    if !prot.contains(MmapProt::PROT_WRITE) || flags.contains(MmapFlags::MAP_SHARED) {
        pages.insert(id, PageKey::new(inode.ino(), inode.dev(), offset));
    }
    Ok(())
}

/// Writes the leading `length` bytes of page `id` back through the
/// filesystem's own write path, starting at byte `offset` of the file.
///
/// # Errors
/// `EINVAL` when the inode has no write path.
pub fn write_page(
    pages: &PageCache,
    buffers: &BufferCache,
    inode: &Arc<dyn Inode>,
    id: PageId,
    offset: usize,
    length: usize,
) -> SyscallResult {
    let size = inode.size().min(length).min(PAGE_SIZE);
    let file = FileMeta::new(inode.clone(), OpenFlags::empty());
    file.set_pos(offset);

    let data = pages.frame(id).as_slice();
    inode.write(pages, buffers, &file, &data[..size])
}

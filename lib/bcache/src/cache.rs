use alloc::{sync::Arc, vec, vec::Vec};

use config::{cache::NR_BUF_RECLAIM, device::DevId, mm::PAGE_SIZE};
use driver::{Device, DeviceManager};
use mm::page_cache::{page::PageId, PageCache};
use mutex::SpinNoIrqLock;
use systype::{
    kinterface::{TaskOps, WaitChannel},
    SysError, SysResult,
};

use crate::buffer::{BlockKey, BufMeta, BufferFlags};

/// Counters describing the buffer cache at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Descriptors in the cache.
    pub buffers: usize,
    /// Descriptors currently holding a data area.
    pub frames: usize,
    /// Buffers waiting on the dirty list.
    pub dirty: usize,
}

struct CacheInner {
    bufs: Vec<BufMeta>,
    hash: Vec<Option<usize>>,
    free_head: Option<usize>,
    free_count: usize,
    dirty_head: Option<usize>,
    dirty_count: usize,
    frames_held: usize,
    sync_gate: bool,
}

/// The buffer cache. Data areas are page frames leased from the page pool,
/// so under memory pressure [`BufferCache::reclaim_buffers`] can hand them
/// back and refill the pool the allocator draws from.
pub struct BufferCache {
    inner: SpinNoIrqLock<CacheInner>,
    devices: Arc<DeviceManager>,
    pages: Arc<PageCache>,
    sched: Arc<dyn TaskOps>,
}

/// A locked buffer, handed out by [`BufferCache::bread`].
///
/// Dropping the guard releases the buffer back to the cache; call
/// [`BufGuard::bwrite`] first when the contents were changed. While the
/// guard lives, no other task can reach this (device, block, size).
pub struct BufGuard<'a> {
    cache: &'a BufferCache,
    idx: usize,
    key: BlockKey,
    frame: PageId,
}

impl BufferCache {
    /// Creates a cache of `nr_bufs` descriptors hashed over `nr_buckets`
    /// chains. Descriptors start without data areas; frames are leased from
    /// `pages` on first use.
    pub fn new(
        nr_bufs: usize,
        nr_buckets: usize,
        devices: Arc<DeviceManager>,
        pages: Arc<PageCache>,
        sched: Arc<dyn TaskOps>,
    ) -> Self {
        let mut inner = CacheInner {
            bufs: Vec::with_capacity(nr_bufs),
            hash: vec![None; nr_buckets],
            free_head: None,
            free_count: 0,
            dirty_head: None,
            dirty_count: 0,
            frames_held: 0,
            sync_gate: false,
        };
        for idx in 0..nr_bufs {
            inner.bufs.push(BufMeta::new(idx));
            inner.free_insert(idx);
        }
        Self {
            inner: SpinNoIrqLock::new(inner),
            devices,
            pages,
            sched,
        }
    }

    /// Returns a locked buffer holding the current contents of `block`.
    ///
    /// A hash hit never touches the device. On a miss the least recently
    /// used descriptor is recycled (flushing it first if dirty) and filled
    /// by the device's read callback.
    ///
    /// # Errors
    /// `ENODEV` when no block device is registered under `dev`, `ENOMEM`
    /// when no data area could be leased, `EIO` when the device read failed.
    pub fn bread(&self, dev: DevId, block: usize, size: usize) -> SysResult<BufGuard<'_>> {
        debug_assert!(size > 0 && size <= PAGE_SIZE);
        let Some(device) = self.devices.get_block(dev) else {
            log::warn!("[BufferCache::bread] no block device {:?}", dev);
            return Err(SysError::ENODEV);
        };

        let key = BlockKey::new(dev, block, size);
        let idx = self.getblk(key)?;

        let (valid, frame) = {
            let inner = self.inner.lock();
            let meta = &inner.bufs[idx];
            (
                meta.flags.contains(BufferFlags::VALID),
                meta.frame.expect("identified buffer has a data area"),
            )
        };
        if !valid {
            // The buffer is locked: nobody else reads or writes this frame.
            let data = self.pages.frame(frame).as_mut_slice();
            if device.read_block(block, &mut data[..size]).is_ok() {
                let mut inner = self.inner.lock();
                inner.bufs[idx].flags.insert(BufferFlags::VALID);
            }
        }

        let valid = {
            self.inner.lock().bufs[idx]
                .flags
                .contains(BufferFlags::VALID)
        };
        if valid {
            Ok(BufGuard {
                cache: self,
                idx,
                key,
                frame,
            })
        } else {
            self.brelse_idx(idx);
            log::warn!(
                "[BufferCache::bread] read error on device {:?}, block {}",
                dev,
                block
            );
            Err(SysError::EIO)
        }
    }

    /// Walks the dirty list and writes out every buffer whose device
    /// matches (every dirty buffer when `dev` is `None`). Buffers the
    /// device refuses stay dirty and are retried by the next sync; the
    /// error is logged, not returned.
    ///
    /// Only one sync runs at a time; concurrent callers queue on the sync
    /// gate. That single-writer rule is what makes it safe to pick up the
    /// next link before waiting on a buffer.
    pub fn sync_buffers(&self, dev: Option<DevId>) {
        loop {
            let mut inner = self.inner.lock();
            if inner.sync_gate {
                drop(inner);
                self.sched.sleep(WaitChannel::BufferSync);
            } else {
                inner.sync_gate = true;
                break;
            }
        }

        let mut cur = self.inner.lock().dirty_head;
        while let Some(idx) = cur {
            let (next, key) = {
                let inner = self.inner.lock();
                (inner.bufs[idx].next_dirty, inner.bufs[idx].key)
            };
            let matches = key
                .map(|k| dev.map_or(true, |d| k.dev == d))
                .unwrap_or(false);
            if matches {
                self.wait_and_lock(idx);
                self.sync_one(idx);
                self.inner.lock().bufs[idx].flags.remove(BufferFlags::LOCKED);
                self.sched.wakeup(WaitChannel::BufferWait);
            }
            cur = next;
        }

        self.inner.lock().sync_gate = false;
        self.sched.wakeup(WaitChannel::BufferSync);
    }

    /// Drops every unlocked buffer of `dev` from the cache: unhashed,
    /// marked invalid, and — since the point is to forget the device —
    /// taken off the dirty list without being written.
    pub fn invalidate_buffers(&self, dev: DevId) {
        let nr_bufs = self.inner.lock().bufs.len();
        for idx in 0..nr_bufs {
            {
                let inner = self.inner.lock();
                let meta = &inner.bufs[idx];
                let matches = meta.key.map_or(false, |k| k.dev == dev);
                if !matches || meta.flags.contains(BufferFlags::LOCKED) {
                    continue;
                }
            }
            self.wait_and_lock(idx);
            {
                let mut inner = self.inner.lock();
                // The identity may have moved on while we waited.
                if inner.bufs[idx].key.map_or(false, |k| k.dev == dev) {
                    inner.hash_remove(idx);
                    inner.dirty_remove(idx);
                    inner.bufs[idx].flags.remove(BufferFlags::VALID);
                }
                inner.bufs[idx].flags.remove(BufferFlags::LOCKED);
            }
            self.sched.wakeup(WaitChannel::BufferWait);
        }
    }

    /// Walks the free list from its LRU end, returning leased data areas to
    /// the page pool: at most [`NR_BUF_RECLAIM`] of them, and at most one
    /// full rotation. Dirty victims are flushed before their frame goes
    /// away. Returns how many frames were freed.
    pub fn reclaim_buffers(&self) -> usize {
        let mut reclaimed = 0;
        let mut first: Option<usize> = None;

        loop {
            let Some(idx) = self.get_free_buffer() else {
                log::warn!("[BufferCache::reclaim_buffers] no more buffers on free list");
                self.sched.sleep(WaitChannel::FreeBuffer);
                continue;
            };

            if self.inner.lock().bufs[idx].flags.contains(BufferFlags::DIRTY) {
                self.sync_one(idx);
            }

            // Reinsertion must go to the tail, or this walk would keep
            // taking the same buffer off the head.
            self.inner.lock().bufs[idx].flags.insert(BufferFlags::VALID);

            match first {
                Some(start) if start == idx => {
                    // Full rotation.
                    self.brelse_idx(idx);
                    break;
                }
                None => first = Some(idx),
                _ => {}
            }

            let frame = {
                let mut inner = self.inner.lock();
                let frame = inner.bufs[idx].frame.take();
                if frame.is_some() {
                    inner.hash_remove(idx);
                    inner.bufs[idx].key = None;
                    inner.frames_held -= 1;
                }
                frame
            };
            if let Some(frame) = frame {
                self.pages.release(frame);
                reclaimed += 1;
                if reclaimed == NR_BUF_RECLAIM {
                    self.brelse_idx(idx);
                    break;
                }
            }
            self.brelse_idx(idx);
        }

        self.sched.wakeup(WaitChannel::BufferWait);
        if reclaimed > 0 {
            // release() only wakes once the pool is comfortably full again;
            // a partial refill must still unblock the task that asked.
            self.sched.wakeup(WaitChannel::FreePage);
        }
        reclaimed
    }

    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.lock();
        BufferStats {
            buffers: inner.bufs.len(),
            frames: inner.frames_held,
            dirty: inner.dirty_count,
        }
    }

    /// Returns the locked buffer identified by `key`, recycling the LRU
    /// descriptor on a miss.
    fn getblk(&self, key: BlockKey) -> SysResult<usize> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(idx) = inner.find(key) {
                    if inner.bufs[idx].flags.contains(BufferFlags::LOCKED) {
                        drop(inner);
                        self.sched.sleep(WaitChannel::BufferWait);
                        continue;
                    }
                    inner.bufs[idx].flags.insert(BufferFlags::LOCKED);
                    inner.free_remove(idx);
                    return Ok(idx);
                }
            }

            let Some(idx) = self.get_free_buffer() else {
                log::warn!("[BufferCache::getblk] no more buffers on free list");
                self.sched.sleep(WaitChannel::FreeBuffer);
                continue;
            };

            if self.inner.lock().bufs[idx].flags.contains(BufferFlags::DIRTY) {
                // Losing the flush error here loses the old contents; the
                // descriptor is repurposed either way.
                self.sync_one(idx);
            } else if self.inner.lock().bufs[idx].frame.is_none() {
                match self.pages.get_free_page() {
                    Some(frame) => {
                        let mut inner = self.inner.lock();
                        inner.bufs[idx].frame = Some(frame);
                        inner.frames_held += 1;
                    }
                    None => {
                        self.brelse_idx(idx);
                        log::warn!("[BufferCache::getblk] no frame for a data area");
                        return Err(SysError::ENOMEM);
                    }
                }
            }

            let mut inner = self.inner.lock();
            inner.hash_remove(idx);
            inner.bufs[idx].key = Some(key);
            inner.hash_insert(idx);
            inner.bufs[idx].flags.remove(BufferFlags::VALID);
            return Ok(idx);
        }
    }

    /// Takes the LRU descriptor off the free list, locked. `None` when the
    /// free list is empty.
    fn get_free_buffer(&self) -> Option<usize> {
        loop {
            let mut inner = self.inner.lock();
            let head = inner.free_head?;
            if inner.bufs[head].flags.contains(BufferFlags::LOCKED) {
                drop(inner);
                self.sched.sleep(WaitChannel::BufferWait);
                continue;
            }
            inner.free_remove(head);
            inner.bufs[head].flags.insert(BufferFlags::LOCKED);
            return Some(head);
        }
    }

    /// Waits for `idx` to become unlocked, then locks it.
    fn wait_and_lock(&self, idx: usize) {
        loop {
            let mut inner = self.inner.lock();
            if inner.bufs[idx].flags.contains(BufferFlags::LOCKED) {
                drop(inner);
                self.sched.sleep(WaitChannel::BufferWait);
            } else {
                inner.bufs[idx].flags.insert(BufferFlags::LOCKED);
                return;
            }
        }
    }

    /// Writes one identified buffer to its device. On success the buffer
    /// leaves the dirty list; on failure it stays there and the error is
    /// only logged. The caller must hold the buffer locked.
    fn sync_one(&self, idx: usize) -> bool {
        let (key, frame) = {
            let inner = self.inner.lock();
            let meta = &inner.bufs[idx];
            match (meta.key, meta.frame) {
                (Some(key), Some(frame)) => (key, frame),
                _ => return false,
            }
        };
        let Some(device) = self.devices.get(key.dev) else {
            log::warn!(
                "[BufferCache::sync_one] block device {:?} not registered",
                key.dev
            );
            return false;
        };
        // Registered, but with nothing that can take a block write: the
        // buffer stays on the dirty list in case a writable device shows
        // up under this id again.
        let Some(device) = device.as_blk() else {
            log::warn!(
                "[BufferCache::sync_one] device {:?} has no block write path",
                key.dev
            );
            return false;
        };

        let data = self.pages.frame(frame).as_slice();
        match device.write_block(key.block, &data[..key.size]) {
            Ok(_) => {
                self.inner.lock().dirty_remove(idx);
                true
            }
            Err(SysError::EROFS) => {
                log::warn!(
                    "[BufferCache::sync_one] write protection on device {:?}, block {}",
                    key.dev,
                    key.block
                );
                false
            }
            Err(_) => {
                log::warn!(
                    "[BufferCache::sync_one] I/O error on device {:?}, block {}",
                    key.dev,
                    key.block
                );
                false
            }
        }
    }

    /// Releases a locked buffer: dirty buffers join the dirty list, the
    /// descriptor returns to the free list, and both the tasks waiting for
    /// a free descriptor and the tasks waiting on this buffer are woken.
    fn brelse_idx(&self, idx: usize) {
        {
            let mut inner = self.inner.lock();
            if inner.bufs[idx].flags.contains(BufferFlags::DIRTY) {
                inner.dirty_insert(idx);
            }
            inner.free_insert(idx);
            inner.bufs[idx].flags.remove(BufferFlags::LOCKED);
        }
        self.sched.wakeup(WaitChannel::FreeBuffer);
        self.sched.wakeup(WaitChannel::BufferWait);
    }
}

impl<'a> BufGuard<'a> {
    pub fn dev(&self) -> DevId {
        self.key.dev
    }

    pub fn block(&self) -> usize {
        self.key.block
    }

    pub fn size(&self) -> usize {
        self.key.size
    }

    pub fn data(&self) -> &[u8] {
        &self.cache.pages.frame(self.frame).as_slice()[..self.key.size]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.cache.pages.frame(self.frame).as_mut_slice()[..self.key.size]
    }

    /// Marks the buffer dirty and releases it. The write reaches the
    /// device later, through a sync or when the descriptor is recycled.
    pub fn bwrite(self) {
        self.cache.inner.lock().bufs[self.idx]
            .flags
            .insert(BufferFlags::DIRTY.union(BufferFlags::VALID));
    }

    /// Releases the buffer without writing. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for BufGuard<'_> {
    fn drop(&mut self) {
        self.cache.brelse_idx(self.idx);
    }
}

impl CacheInner {
    fn bucket_of(&self, key: BlockKey) -> usize {
        (key.dev.bits() ^ key.block) % self.hash.len()
    }

    fn find(&self, key: BlockKey) -> Option<usize> {
        let mut cur = self.hash[self.bucket_of(key)];
        while let Some(idx) = cur {
            if self.bufs[idx].key == Some(key) {
                return Some(idx);
            }
            cur = self.bufs[idx].next_hash;
        }
        None
    }

    /// Inserts at the tail (most recently used), except that a buffer with
    /// stale contents becomes the new head so it is recycled first.
    fn free_insert(&mut self, idx: usize) {
        match self.free_head {
            None => {
                self.bufs[idx].prev_free = idx;
                self.bufs[idx].next_free = idx;
                self.free_head = Some(idx);
            }
            Some(head) => {
                let tail = self.bufs[head].prev_free;
                self.bufs[idx].next_free = head;
                self.bufs[idx].prev_free = tail;
                self.bufs[tail].next_free = idx;
                self.bufs[head].prev_free = idx;
                if !self.bufs[idx].flags.contains(BufferFlags::VALID) {
                    self.free_head = Some(idx);
                }
            }
        }
        self.free_count += 1;
    }

    fn free_remove(&mut self, idx: usize) {
        if self.free_count == 0 {
            return;
        }
        let prev = self.bufs[idx].prev_free;
        let next = self.bufs[idx].next_free;
        self.bufs[prev].next_free = next;
        self.bufs[next].prev_free = prev;
        self.free_count -= 1;
        if self.free_head == Some(idx) {
            self.free_head = Some(next);
        }
        if self.free_count == 0 {
            self.free_head = None;
        }
    }

    fn hash_insert(&mut self, idx: usize) {
        let Some(key) = self.bufs[idx].key else {
            return;
        };
        let bucket = self.bucket_of(key);
        let old = self.hash[bucket];
        self.bufs[idx].prev_hash = None;
        self.bufs[idx].next_hash = old;
        if let Some(old) = old {
            self.bufs[old].prev_hash = Some(idx);
        }
        self.hash[bucket] = Some(idx);
    }

    fn hash_remove(&mut self, idx: usize) {
        let Some(key) = self.bufs[idx].key else {
            return;
        };
        let bucket = self.bucket_of(key);
        let prev = self.bufs[idx].prev_hash;
        let next = self.bufs[idx].next_hash;
        if let Some(next) = next {
            self.bufs[next].prev_hash = prev;
        }
        if let Some(prev) = prev {
            self.bufs[prev].next_hash = next;
        }
        if self.hash[bucket] == Some(idx) {
            self.hash[bucket] = next;
        }
        self.bufs[idx].prev_hash = None;
        self.bufs[idx].next_hash = None;
    }

    fn dirty_insert(&mut self, idx: usize) {
        if self.bufs[idx].on_dirty {
            return;
        }
        self.bufs[idx].prev_dirty = None;
        self.bufs[idx].next_dirty = self.dirty_head;
        if let Some(head) = self.dirty_head {
            self.bufs[head].prev_dirty = Some(idx);
        }
        self.dirty_head = Some(idx);
        self.bufs[idx].on_dirty = true;
        self.dirty_count += 1;
    }

    fn dirty_remove(&mut self, idx: usize) {
        if self.bufs[idx].on_dirty {
            let prev = self.bufs[idx].prev_dirty;
            let next = self.bufs[idx].next_dirty;
            if let Some(next) = next {
                self.bufs[next].prev_dirty = prev;
            }
            if let Some(prev) = prev {
                self.bufs[prev].next_dirty = next;
            }
            if self.dirty_head == Some(idx) {
                self.dirty_head = next;
            }
            self.bufs[idx].prev_dirty = None;
            self.bufs[idx].next_dirty = None;
            self.bufs[idx].on_dirty = false;
            self.dirty_count -= 1;
        }
        self.bufs[idx].flags.remove(BufferFlags::DIRTY);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::{sync::Arc, vec::Vec};
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use config::device::{DevId, DeviceMajor};
    use driver::{
        block::RamBlock,
        device::{Device, DeviceMeta},
        BlockDevice, DeviceManager,
    };
    use mm::page_cache::PageCache;
    use mutex::SpinLock;
    use systype::{
        kinterface::{TaskOps, WaitChannel},
        time::TimeSpec,
        SysError, SyscallResult,
    };

    use super::{BufferCache, BufferFlags};

    struct RecordingTask {
        wakes: SpinLock<Vec<WaitChannel>>,
    }

    impl RecordingTask {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                wakes: SpinLock::new(Vec::new()),
            })
        }

        fn woke(&self, chan: WaitChannel) -> bool {
            self.wakes.lock().contains(&chan)
        }
    }

    impl TaskOps for RecordingTask {
        fn sleep(&self, _chan: WaitChannel) {}

        fn wakeup(&self, chan: WaitChannel) {
            self.wakes.lock().push(chan);
        }

        fn now(&self) -> TimeSpec {
            TimeSpec::default()
        }
    }

    /// RAM disk that counts transfers and can fail reads on demand.
    struct CountingDisk {
        ram: Arc<RamBlock>,
        reads: AtomicUsize,
        writes: AtomicUsize,
        fail_reads: AtomicBool,
    }

    impl CountingDisk {
        fn new(dev_id: DevId, nblocks: usize, block_size: usize) -> Arc<Self> {
            Arc::new(Self {
                ram: RamBlock::new(dev_id, "ram0", nblocks, block_size),
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
                fail_reads: AtomicBool::new(false),
            })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::Relaxed)
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::Relaxed)
        }
    }

    impl Device for CountingDisk {
        fn meta(&self) -> &DeviceMeta {
            self.ram.meta()
        }

        fn as_blk(self: Arc<Self>) -> Option<Arc<dyn BlockDevice>> {
            Some(self)
        }
    }

    impl BlockDevice for CountingDisk {
        fn read_block(&self, block: usize, buf: &mut [u8]) -> SyscallResult {
            if self.fail_reads.load(Ordering::Relaxed) {
                return Err(SysError::EIO);
            }
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.ram.read_block(block, buf)
        }

        fn write_block(&self, block: usize, buf: &[u8]) -> SyscallResult {
            let res = self.ram.write_block(block, buf);
            if res.is_ok() {
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            res
        }

        fn size(&self) -> usize {
            self.ram.size()
        }

        fn block_size(&self) -> usize {
            self.ram.block_size()
        }
    }

    fn dev() -> DevId {
        DevId::new(DeviceMajor::Block, 0)
    }

    struct Fixture {
        cache: BufferCache,
        pages: Arc<PageCache>,
        disk: Arc<CountingDisk>,
        sched: Arc<RecordingTask>,
    }

    fn setup(nr_bufs: usize, nr_pages: usize) -> Fixture {
        let sched = RecordingTask::new();
        let pages = Arc::new(PageCache::new(nr_pages, 8, sched.clone()).unwrap());
        let devices = Arc::new(DeviceManager::new());
        let disk = CountingDisk::new(dev(), 64, 512);
        devices.register(disk.clone());
        let cache = BufferCache::new(nr_bufs, 8, devices, pages.clone(), sched.clone());
        Fixture {
            cache,
            pages,
            disk,
            sched,
        }
    }

    #[test]
    fn bread_reads_the_device_once() {
        let f = setup(4, 16);
        f.disk.ram.write_block(100, &[0xAA; 512]).unwrap();

        let buf = f.cache.bread(dev(), 100, 512).unwrap();
        assert!(buf.data().iter().all(|b| *b == 0xAA));
        drop(buf);

        let buf = f.cache.bread(dev(), 100, 512).unwrap();
        assert!(buf.data().iter().all(|b| *b == 0xAA));
        drop(buf);

        assert_eq!(f.disk.reads(), 1);
    }

    #[test]
    fn distinct_sizes_are_distinct_buffers() {
        let f = setup(4, 16);
        f.cache.bread(dev(), 7, 512).unwrap();
        f.cache.bread(dev(), 7, 256).unwrap();
        assert_eq!(f.disk.reads(), 2);
    }

    #[test]
    fn lru_descriptor_is_evicted_first() {
        let f = setup(2, 16);
        f.cache.bread(dev(), 1, 512).unwrap();
        f.cache.bread(dev(), 2, 512).unwrap();
        // Two descriptors, both released: block 1 is the LRU victim.
        f.cache.bread(dev(), 3, 512).unwrap();
        f.cache.bread(dev(), 1, 512).unwrap();
        assert_eq!(f.disk.reads(), 4);
    }

    #[test]
    fn bwrite_is_deferred_until_sync() {
        let f = setup(4, 16);
        let mut buf = f.cache.bread(dev(), 5, 512).unwrap();
        buf.data_mut().fill(0xBB);
        buf.bwrite();

        assert_eq!(f.cache.stats().dirty, 1);
        assert_eq!(f.disk.writes(), 0);

        f.cache.sync_buffers(Some(dev()));
        assert_eq!(f.disk.writes(), 1);
        assert_eq!(f.cache.stats().dirty, 0);
        assert_eq!(f.disk.ram.snapshot(5), alloc::vec![0xBB; 512]);

        // Nothing left to write.
        f.cache.sync_buffers(Some(dev()));
        assert_eq!(f.disk.writes(), 1);
    }

    #[test]
    fn bwrite_keeps_contents_visible_without_a_device_read() {
        let f = setup(4, 16);
        let mut buf = f.cache.bread(dev(), 5, 512).unwrap();
        buf.data_mut().fill(0xCD);
        buf.bwrite();
        assert_eq!(f.disk.reads(), 1);

        let buf = f.cache.bread(dev(), 5, 512).unwrap();
        assert!(buf.data().iter().all(|b| *b == 0xCD));
        assert_eq!(f.disk.reads(), 1);
    }

    #[test]
    fn sync_skips_other_devices() {
        let f = setup(4, 16);
        let mut buf = f.cache.bread(dev(), 5, 512).unwrap();
        buf.data_mut().fill(0xBB);
        buf.bwrite();

        f.cache
            .sync_buffers(Some(DevId::new(DeviceMajor::Block, 9)));
        assert_eq!(f.disk.writes(), 0);
        assert_eq!(f.cache.stats().dirty, 1);

        f.cache.sync_buffers(None);
        assert_eq!(f.disk.writes(), 1);
        assert_eq!(f.cache.stats().dirty, 0);
    }

    #[test]
    fn write_protected_buffers_stay_dirty_for_retry() {
        let f = setup(4, 16);
        let mut buf = f.cache.bread(dev(), 6, 512).unwrap();
        buf.data_mut().fill(0xEE);
        buf.bwrite();

        f.disk.ram.set_read_only(true);
        f.cache.sync_buffers(None);
        assert_eq!(f.disk.writes(), 0);
        assert_eq!(f.cache.stats().dirty, 1);

        f.disk.ram.set_read_only(false);
        f.cache.sync_buffers(None);
        assert_eq!(f.disk.writes(), 1);
        assert_eq!(f.cache.stats().dirty, 0);
    }

    /// Device with no block I/O at all.
    struct PlainDevice {
        meta: DeviceMeta,
    }

    impl Device for PlainDevice {
        fn meta(&self) -> &DeviceMeta {
            &self.meta
        }
    }

    #[test]
    fn device_without_a_block_write_path_leaves_buffers_dirty() {
        let f = setup(4, 16);
        let mut buf = f.cache.bread(dev(), 5, 512).unwrap();
        buf.data_mut().fill(0x9A);
        buf.bwrite();

        // The disk disappears behind the cache's back, replaced under the
        // same id by something that cannot take block writes.
        f.cache.devices.register(Arc::new(PlainDevice {
            meta: DeviceMeta::new(dev(), "null0"),
        }));

        f.cache.sync_buffers(None);
        assert_eq!(f.cache.stats().dirty, 1);
        assert_eq!(f.disk.writes(), 0);
    }

    #[test]
    fn bread_surfaces_read_errors_and_recovers() {
        let f = setup(4, 16);
        f.disk.fail_reads.store(true, Ordering::Relaxed);
        assert_eq!(
            f.cache.bread(dev(), 3, 512).map(|_| ()),
            Err(SysError::EIO)
        );

        f.disk.fail_reads.store(false, Ordering::Relaxed);
        assert!(f.cache.bread(dev(), 3, 512).is_ok());
    }

    #[test]
    fn bread_requires_a_registered_device() {
        let f = setup(4, 16);
        let ghost = DevId::new(DeviceMajor::Block, 3);
        assert_eq!(
            f.cache.bread(ghost, 0, 512).map(|_| ()),
            Err(SysError::ENODEV)
        );
    }

    #[test]
    fn invalidate_forgets_clean_and_dirty_buffers() {
        let f = setup(4, 16);
        f.cache.bread(dev(), 2, 512).unwrap();
        let mut buf = f.cache.bread(dev(), 3, 512).unwrap();
        buf.data_mut().fill(0x77);
        buf.bwrite();
        assert_eq!(f.cache.stats().dirty, 1);

        f.cache.invalidate_buffers(dev());

        // Discarded: the dirty contents never reach the device.
        f.cache.sync_buffers(None);
        assert_eq!(f.disk.writes(), 0);
        assert_eq!(f.cache.stats().dirty, 0);

        // And the cache re-reads from the device.
        f.cache.bread(dev(), 2, 512).unwrap();
        assert_eq!(f.disk.reads(), 3);
    }

    #[test]
    fn reclaim_returns_frames_to_the_page_pool() {
        let f = setup(4, 8);
        for block in 0..4 {
            f.cache.bread(dev(), block, 512).unwrap();
        }
        assert_eq!(f.cache.stats().frames, 4);
        assert_eq!(f.pages.stats().free, 4);

        let reclaimed = f.cache.reclaim_buffers();
        assert_eq!(reclaimed, 4);
        assert_eq!(f.cache.stats().frames, 0);
        assert_eq!(f.pages.stats().free, 8);
        assert!(f.sched.woke(WaitChannel::FreePage));

        // A second pass finds nothing to free and still terminates.
        assert_eq!(f.cache.reclaim_buffers(), 0);
    }

    #[test]
    fn reclaim_flushes_dirty_buffers_before_freeing() {
        let f = setup(4, 8);
        let mut buf = f.cache.bread(dev(), 9, 512).unwrap();
        buf.data_mut().fill(0x42);
        buf.bwrite();

        let reclaimed = f.cache.reclaim_buffers();
        assert!(reclaimed >= 1);
        assert_eq!(f.disk.writes(), 1);
        assert_eq!(f.disk.ram.snapshot(9), alloc::vec![0x42; 512]);
    }

    #[test]
    fn frame_exhaustion_is_enomem_and_wakes_the_reclaimer() {
        let f = setup(4, 2);
        f.cache.bread(dev(), 0, 512).unwrap();
        f.cache.bread(dev(), 1, 512).unwrap();

        assert_eq!(
            f.cache.bread(dev(), 2, 512).map(|_| ()),
            Err(SysError::ENOMEM)
        );
        assert!(f.sched.woke(WaitChannel::Kswapd));
    }

    #[test]
    fn failed_read_marks_the_descriptor_for_reuse_first() {
        let f = setup(4, 16);
        f.disk.fail_reads.store(true, Ordering::Relaxed);
        let _ = f.cache.bread(dev(), 3, 512);
        f.disk.fail_reads.store(false, Ordering::Relaxed);

        // The failed descriptor went back as head of the free list, so the
        // next miss recycles it instead of a fresh one.
        f.cache.bread(dev(), 4, 512).unwrap();
        assert_eq!(f.cache.stats().frames, 1);
    }

    #[test]
    fn guard_flags_report_a_locked_valid_buffer() {
        let f = setup(4, 16);
        let buf = f.cache.bread(dev(), 1, 512).unwrap();
        let idx = buf.idx;
        let flags = f.cache.inner.lock().bufs[idx].flags;
        assert!(flags.contains(BufferFlags::LOCKED));
        assert!(flags.contains(BufferFlags::VALID));
        drop(buf);
        let flags = f.cache.inner.lock().bufs[idx].flags;
        assert!(!flags.contains(BufferFlags::LOCKED));
    }
}

//! The page pool and page cache.
//!
//! One [`PageCache`] owns a fixed arena of page frames and their
//! descriptors. Free frames sit on a circular free list in LRU order; frames
//! that cache file contents are additionally reachable through a chained
//! hash keyed by (inode, offset). A frame can be both — a cached page with
//! no current holder stays hashed *and* free, so the next lookup revives it
//! without touching the device, while the next allocation may just as well
//! recycle it.
//!
//! All list and flag manipulation happens under one internal spinlock;
//! nothing blocks while holding it. When the pool runs dry the allocator
//! wakes the reclaimer task and puts the caller to sleep until frames come
//! back.

pub mod page;

use alloc::{sync::Arc, vec, vec::Vec};

use config::{
    cache::NR_BUF_RECLAIM,
    device::DevId,
    mm::{page_base, page_offset, PAGE_SIZE},
};
use mutex::SpinNoIrqLock;
use systype::{
    kinterface::{TaskOps, WaitChannel},
    SysResult,
};

use crate::frame::FrameTracker;
use self::page::{PageFlags, PageId, PageKey, PageMeta};

/// Counters describing the pool at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Descriptors in the pool, reserved ones included.
    pub total: usize,
    /// Pages permanently withheld from use.
    pub reserved: usize,
    /// Pages currently on the free list.
    pub free: usize,
    /// Pages currently carrying a cache identity.
    pub cached: usize,
}

struct PoolInner {
    pages: Vec<PageMeta>,
    hash: Vec<Option<PageId>>,
    free_head: Option<PageId>,
    free_count: usize,
    cached: usize,
}

/// A fixed pool of page frames doubling as the cache of file pages.
pub struct PageCache {
    frames: Vec<Option<FrameTracker>>,
    total: usize,
    reserved: usize,
    inner: SpinNoIrqLock<PoolInner>,
    sched: Arc<dyn TaskOps>,
}

impl PageCache {
    /// Creates a pool of `nr_pages` frames hashed over `nr_buckets` chains.
    ///
    /// # Errors
    /// Returns `ENOMEM` when the frames cannot be allocated.
    pub fn new(nr_pages: usize, nr_buckets: usize, sched: Arc<dyn TaskOps>) -> SysResult<Self> {
        Self::with_reserved(nr_pages, nr_buckets, &[], sched)
    }

    /// Like [`PageCache::new`], but the pages whose indices appear in
    /// `reserved` get no frame and never enter the free list or the hash.
    pub fn with_reserved(
        nr_pages: usize,
        nr_buckets: usize,
        reserved: &[usize],
        sched: Arc<dyn TaskOps>,
    ) -> SysResult<Self> {
        let mut frames = Vec::with_capacity(nr_pages);
        let mut inner = PoolInner {
            pages: Vec::with_capacity(nr_pages),
            hash: vec![None; nr_buckets],
            free_head: None,
            free_count: 0,
            cached: 0,
        };

        let mut nr_reserved = 0;
        for n in 0..nr_pages {
            if reserved.contains(&n) {
                frames.push(None);
                inner.pages.push(PageMeta::new(n, PageFlags::RESERVED));
                nr_reserved += 1;
                continue;
            }
            frames.push(Some(FrameTracker::build()?));
            inner.pages.push(PageMeta::new(n, PageFlags::empty()));
            inner.free_insert_tail(n);
        }

        Ok(Self {
            frames,
            total: nr_pages,
            reserved: nr_reserved,
            inner: SpinNoIrqLock::new(inner),
            sched,
        })
    }

    /// Takes the least recently used free page, evicting whatever identity
    /// it last carried, and returns it anonymous with one reference held.
    ///
    /// When the pool is empty this wakes the reclaimer and sleeps once on
    /// the free-page channel; if nothing came back it reports the
    /// out-of-memory condition and returns `None`.
    pub fn get_free_page(&self) -> Option<PageId> {
        let mut inner = self.inner.lock();
        if inner.free_count == 0 {
            drop(inner);
            self.sched.wakeup(WaitChannel::Kswapd);
            self.sched.sleep(WaitChannel::FreePage);

            inner = self.inner.lock();
            if inner.free_count == 0 {
                log::error!("[PageCache::get_free_page] out of memory");
                return None;
            }
        }

        let id = inner.free_head.expect("free count positive with no head");
        inner.free_remove(id);
        inner.hash_remove(id);
        let meta = &mut inner.pages[id];
        meta.key = None;
        meta.count = 1;
        Some(id)
    }

    /// Finds the cached page for `key` and takes a reference on it. A hit
    /// that was resting on the free list is pulled off it first.
    pub fn lookup(&self, key: PageKey) -> Option<PageId> {
        let mut inner = self.inner.lock();
        let mut cur = inner.hash[inner.bucket_of(key.ino, key.offset)];
        while let Some(id) = cur {
            if inner.pages[id].key == Some(key) {
                if inner.pages[id].count == 0 {
                    inner.free_remove(id);
                }
                inner.pages[id].count += 1;
                return Some(id);
            }
            cur = inner.pages[id].next_hash;
        }
        None
    }

    /// Gives `id` the cache identity `key` and makes it reachable through
    /// the hash. The caller must hold a reference on `id` and `key.offset`
    /// must be page aligned.
    pub fn insert(&self, id: PageId, key: PageKey) {
        debug_assert!(key.offset % PAGE_SIZE == 0);
        let mut inner = self.inner.lock();
        debug_assert!(inner.pages[id].count > 0);
        inner.pages[id].key = Some(key);
        inner.hash_insert(id);
    }

    /// Drops one reference on `id`. The last reference sends the page back
    /// to the free list: to the tail if it still caches file contents, to
    /// the head if it is anonymous and worth recycling first.
    ///
    /// # Panics
    /// Panics when `id` is not a page of this pool — references are counted,
    /// so an out-of-range release means the caller's bookkeeping is corrupt.
    pub fn release(&self, id: PageId) {
        if !self.is_valid_page(id) {
            panic!("page {} released outside the pool (0..{})", id, self.total);
        }

        let mut inner = self.inner.lock();
        if inner.pages[id].count == 0 {
            log::warn!("[PageCache::release] page {} is already free", id);
            return;
        }
        inner.pages[id].count -= 1;
        if inner.pages[id].count > 0 {
            return;
        }

        inner.free_insert_tail(id);
        if inner.pages[id].key.is_none() {
            // Nothing cached on it; recycle it before the pages that are
            // still worth a hash hit.
            inner.free_head = Some(id);
        }
        let wake = inner.free_count > NR_BUF_RECLAIM;
        drop(inner);

        if wake {
            self.sched.wakeup(WaitChannel::FreePage);
        }
    }

    /// Acquires the lock bit of `id`, sleeping on the page's wait channel
    /// while another task holds it.
    pub fn lock_page(&self, id: PageId) {
        loop {
            let mut inner = self.inner.lock();
            if inner.pages[id].flags.contains(PageFlags::LOCKED) {
                drop(inner);
                self.sched.sleep(WaitChannel::Page(id));
            } else {
                inner.pages[id].flags.insert(PageFlags::LOCKED);
                return;
            }
        }
    }

    /// Releases the lock bit of `id` and wakes its waiters.
    pub fn unlock_page(&self, id: PageId) {
        let mut inner = self.inner.lock();
        inner.pages[id].flags.remove(PageFlags::LOCKED);
        drop(inner);
        self.sched.wakeup(WaitChannel::Page(id));
    }

    /// Write-through from the block layer: if the page holding byte
    /// `offset` of the file is cached, patch the written fragment into it
    /// so readers keep seeing the newest contents.
    pub fn update(&self, ino: usize, dev: DevId, offset: usize, src: &[u8]) {
        if src.is_empty() {
            return;
        }
        let poffset = page_offset(offset);
        let bytes = (PAGE_SIZE - poffset).min(src.len());
        if let Some(id) = self.lookup(PageKey::new(ino, dev, page_base(offset))) {
            self.lock_page(id);
            self.frame(id).as_mut_slice()[poffset..poffset + bytes]
                .copy_from_slice(&src[..bytes]);
            self.unlock_page(id);
            self.release(id);
        }
    }

    /// The frame behind `id`.
    ///
    /// # Panics
    /// Panics for reserved pages, which have no frame.
    pub fn frame(&self, id: PageId) -> &FrameTracker {
        self.frames[id]
            .as_ref()
            .expect("reserved page has no frame")
    }

    pub fn is_valid_page(&self, id: PageId) -> bool {
        id < self.total
    }

    pub fn stats(&self) -> PageStats {
        let inner = self.inner.lock();
        PageStats {
            total: self.total,
            reserved: self.reserved,
            free: inner.free_count,
            cached: inner.cached,
        }
    }

    #[cfg(test)]
    fn free_ids(&self) -> Vec<PageId> {
        let inner = self.inner.lock();
        let mut ids = Vec::new();
        if let Some(head) = inner.free_head {
            let mut cur = head;
            loop {
                ids.push(cur);
                cur = inner.pages[cur].next_free;
                if cur == head {
                    break;
                }
            }
        }
        ids
    }

    #[cfg(test)]
    fn count_of(&self, id: PageId) -> usize {
        self.inner.lock().pages[id].count
    }
}

impl PoolInner {
    fn bucket_of(&self, ino: usize, offset: usize) -> usize {
        (ino ^ offset) % self.hash.len()
    }

    fn free_insert_tail(&mut self, id: PageId) {
        match self.free_head {
            None => {
                self.pages[id].prev_free = id;
                self.pages[id].next_free = id;
                self.free_head = Some(id);
            }
            Some(head) => {
                let tail = self.pages[head].prev_free;
                self.pages[id].next_free = head;
                self.pages[id].prev_free = tail;
                self.pages[tail].next_free = id;
                self.pages[head].prev_free = id;
            }
        }
        self.free_count += 1;
    }

    fn free_remove(&mut self, id: PageId) {
        if self.free_count == 0 {
            return;
        }
        let prev = self.pages[id].prev_free;
        let next = self.pages[id].next_free;
        self.pages[prev].next_free = next;
        self.pages[next].prev_free = prev;
        self.free_count -= 1;
        if self.free_head == Some(id) {
            self.free_head = Some(next);
        }
        if self.free_count == 0 {
            self.free_head = None;
        }
    }

    fn hash_insert(&mut self, id: PageId) {
        let Some(key) = self.pages[id].key else {
            return;
        };
        let bucket = self.bucket_of(key.ino, key.offset);
        let old = self.hash[bucket];
        self.pages[id].prev_hash = None;
        self.pages[id].next_hash = old;
        if let Some(old) = old {
            self.pages[old].prev_hash = Some(id);
        }
        self.hash[bucket] = Some(id);
        self.cached += 1;
    }

    fn hash_remove(&mut self, id: PageId) {
        let Some(key) = self.pages[id].key else {
            return;
        };
        let bucket = self.bucket_of(key.ino, key.offset);
        let prev = self.pages[id].prev_hash;
        let next = self.pages[id].next_hash;
        if let Some(next) = next {
            self.pages[next].prev_hash = prev;
        }
        if let Some(prev) = prev {
            self.pages[prev].next_hash = next;
        }
        if self.hash[bucket] == Some(id) {
            self.hash[bucket] = next;
        }
        self.pages[id].prev_hash = None;
        self.pages[id].next_hash = None;
        self.cached -= 1;
    }
}

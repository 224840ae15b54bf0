use bitflags::bitflags;
use config::device::DevId;
use mm::page_cache::page::PageId;

bitflags! {
    /// State bits of one buffer descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u8 {
        /// Contents mirror the device, or a newer in-memory write.
        const VALID  = 0x1;
        /// In use by some task; waiters queue on the shared buffer channel.
        const LOCKED = 0x2;
        /// Contents newer than the device; must eventually be written.
        const DIRTY  = 0x4;
    }
}

/// Identity of a buffer: one block of one device at one block size. The
/// size is part of the identity, so the same block read at two sizes
/// occupies two buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockKey {
    pub dev: DevId,
    pub block: usize,
    pub size: usize,
}

impl BlockKey {
    pub const fn new(dev: DevId, block: usize, size: usize) -> Self {
        Self { dev, block, size }
    }
}

/// Link and state words of one descriptor, guarded by the cache lock.
///
/// `key` is `None` until the descriptor is first identified and again after
/// a reclaim strips its data area. `frame` is the page leased for the data
/// area; it survives re-identification, so a recycled descriptor does not
/// pay for a new allocation.
pub(crate) struct BufMeta {
    pub key: Option<BlockKey>,
    pub flags: BufferFlags,
    pub frame: Option<PageId>,
    pub prev_free: usize,
    pub next_free: usize,
    pub prev_hash: Option<usize>,
    pub next_hash: Option<usize>,
    pub prev_dirty: Option<usize>,
    pub next_dirty: Option<usize>,
    pub on_dirty: bool,
}

impl BufMeta {
    pub(crate) fn new(idx: usize) -> Self {
        Self {
            key: None,
            flags: BufferFlags::empty(),
            frame: None,
            prev_free: idx,
            next_free: idx,
            prev_hash: None,
            next_hash: None,
            prev_dirty: None,
            next_dirty: None,
            on_dirty: false,
        }
    }
}

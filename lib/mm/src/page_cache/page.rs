//! Per-page descriptor state.
//!
//! A page descriptor represents one frame of the pool for its whole life.
//! Beyond the frame itself it carries what the cache needs to know about the
//! frame right now: whether it caches a file page (and for which file), how
//! many holders reference it, and its lock/reserved state. A page with no
//! key is "anonymous" — it belongs to whoever holds a reference and has no
//! cache identity.
//!
//! A page is used in the following scenarios:
//! - Anonymous: leased out by `get_free_page`, e.g. as the data area of a
//!   buffer or a transient read target. Never hashed.
//! - File-backed: associated with an (inode, device, offset) triple and
//!   reachable through the page hash until the frame is recycled.
//! - Reserved: permanently withheld from the pool (firmware ranges, the
//!   kernel image). Reserved pages have no frame here and never move.

use bitflags::bitflags;
use config::device::DevId;

/// Pool index of a page descriptor; the stable identity of its frame.
pub type PageId = usize;

bitflags! {
    /// State bits of one page descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u16 {
        /// In use by some task; others queue on the page's wait channel.
        const LOCKED   = 0x001;
        /// Permanently unavailable to the pool.
        const RESERVED = 0x100;
    }
}

/// Cache identity of a file-backed page: which file on which device, at
/// which page-aligned byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageKey {
    pub ino: usize,
    pub dev: DevId,
    pub offset: usize,
}

impl PageKey {
    pub const fn new(ino: usize, dev: DevId, offset: usize) -> Self {
        Self { ino, dev, offset }
    }
}

/// Link and state words of one descriptor. All fields are guarded by the
/// pool lock; the free links are meaningful only while the page is on the
/// free list, the hash links only while it is hashed.
pub(crate) struct PageMeta {
    pub key: Option<PageKey>,
    pub count: usize,
    pub flags: PageFlags,
    pub prev_free: PageId,
    pub next_free: PageId,
    pub prev_hash: Option<PageId>,
    pub next_hash: Option<PageId>,
}

impl PageMeta {
    pub(crate) fn new(id: PageId, flags: PageFlags) -> Self {
        Self {
            key: None,
            count: 0,
            flags,
            prev_free: id,
            next_free: id,
            prev_hash: None,
            next_hash: None,
        }
    }
}

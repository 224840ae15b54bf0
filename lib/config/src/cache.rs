//! Default sizing for the buffer cache and the page pool.
//!
//! All of these are defaults: the pools take their actual sizes as
//! constructor arguments, so a small embedding (or a test) can run with a
//! handful of descriptors.

/// Default number of buffer descriptors in the buffer cache.
pub const NR_BUFFERS: usize = 64;

/// Default number of buffer hash buckets.
pub const NR_BUF_HASH: usize = 16;

/// Default number of page descriptors in the page pool.
pub const NR_PAGES: usize = 256;

/// Default number of page hash buckets.
pub const NR_PAGE_HASH: usize = 32;

/// Upper bound on the data areas freed by one buffer-reclaim pass. It is
/// also the free-page level a release must push the pool above before
/// waking tasks that ran out of pages, so that a woken task does not
/// immediately run the pool dry again.
pub const NR_BUF_RECLAIM: usize = 32;

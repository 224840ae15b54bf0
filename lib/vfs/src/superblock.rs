use alloc::sync::Arc;

use config::device::DevId;

/// What the caches need to know about a mounted filesystem instance: where
/// it lives and the block size it was mounted with.
pub struct SuperBlock {
    /// The backing block device.
    pub device: DevId,
    /// Block size in bytes. At most a page; a page holds a whole number of
    /// blocks.
    pub block_size: usize,
}

impl SuperBlock {
    pub fn new(device: DevId, block_size: usize) -> Arc<Self> {
        Arc::new(Self { device, block_size })
    }
}

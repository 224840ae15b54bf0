//! RAM-backed block device.
//!
//! Useful as a root device for early bring-up and as the disk behind the
//! cache tests: contents are observable from the outside and a write-protect
//! switch turns the medium read-only at runtime.

use alloc::{sync::Arc, vec, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

use config::device::DevId;
use mutex::SpinNoIrqLock;
use systype::{SysError, SyscallResult};

use crate::{
    device::{Device, DeviceMeta},
    BlockDevice,
};

pub struct RamBlock {
    meta: DeviceMeta,
    block_size: usize,
    nblocks: usize,
    data: SpinNoIrqLock<Vec<u8>>,
    read_only: AtomicBool,
}

impl RamBlock {
    pub fn new(dev_id: DevId, name: &str, nblocks: usize, block_size: usize) -> Arc<Self> {
        Arc::new(Self {
            meta: DeviceMeta::new(dev_id, name),
            block_size,
            nblocks,
            data: SpinNoIrqLock::new(vec![0; nblocks * block_size]),
            read_only: AtomicBool::new(false),
        })
    }

    /// Turns write protection on or off.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    /// Raw contents of one block, for inspection from outside the device.
    pub fn snapshot(&self, block: usize) -> Vec<u8> {
        let start = block * self.block_size;
        self.data.lock()[start..start + self.block_size].to_vec()
    }

    fn check_range(&self, block: usize, len: usize) -> Result<usize, SysError> {
        let start = block * self.block_size;
        if block >= self.nblocks || start + len > self.nblocks * self.block_size {
            log::warn!(
                "[RamBlock] access past end of {}: block {} len {}",
                self.name(),
                block,
                len
            );
            return Err(SysError::EIO);
        }
        Ok(start)
    }
}

impl Device for RamBlock {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn as_blk(self: Arc<Self>) -> Option<Arc<dyn BlockDevice>> {
        Some(self)
    }
}

impl BlockDevice for RamBlock {
    fn read_block(&self, block: usize, buf: &mut [u8]) -> SyscallResult {
        let start = self.check_range(block, buf.len())?;
        let data = self.data.lock();
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(buf.len())
    }

    fn write_block(&self, block: usize, buf: &[u8]) -> SyscallResult {
        if self.read_only.load(Ordering::Relaxed) {
            return Err(SysError::EROFS);
        }
        let start = self.check_range(block, buf.len())?;
        let mut data = self.data.lock();
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> usize {
        self.nblocks
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use config::device::{DevId, DeviceMajor, BLOCK_SIZE};
    use systype::SysError;

    use super::RamBlock;
    use crate::BlockDevice;

    fn disk() -> alloc::sync::Arc<RamBlock> {
        RamBlock::new(DevId::new(DeviceMajor::Block, 0), "ram0", 16, BLOCK_SIZE)
    }

    #[test]
    fn write_then_read_round_trips() {
        let blk = disk();
        let mut buf = alloc::vec::Vec::new();
        for i in 0..BLOCK_SIZE {
            buf.push(i as u8);
        }
        blk.write_block(10, &buf).unwrap();

        let mut rbuf = [0u8; BLOCK_SIZE];
        blk.read_block(10, &mut rbuf).unwrap();
        assert_eq!(&rbuf[..], &buf[..]);
    }

    #[test]
    fn write_protected_medium_refuses_writes() {
        let blk = disk();
        blk.set_read_only(true);
        assert_eq!(blk.write_block(0, &[0u8; 512]), Err(SysError::EROFS));
        blk.set_read_only(false);
        assert!(blk.write_block(0, &[0u8; 512]).is_ok());
    }

    #[test]
    fn out_of_range_block_is_an_io_error() {
        let blk = disk();
        let mut buf = [0u8; 512];
        assert_eq!(blk.read_block(16, &mut buf), Err(SysError::EIO));
    }
}

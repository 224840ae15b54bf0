//! Shared fixture for the end-to-end tests: a scheduler stub that runs the
//! reclaimer when page allocation stalls, an instrumented RAM disk, and one
//! assembled cache + filesystem stack.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Weak,
};

use bcache::BufferCache;
use config::device::{DevId, DeviceMajor};
use driver::{
    block::RamBlock,
    device::{Device, DeviceMeta},
    BlockDevice, DeviceManager,
};
use mm::page_cache::PageCache;
use mutex::SpinLock;
use osfs::SimpleFs;
use spin::Once;
use systype::{
    kinterface::{TaskOps, WaitChannel},
    time::TimeSpec,
    SysError, SyscallResult,
};

pub const DEV: DevId = DevId::new(DeviceMajor::Block, 0);
pub const BLK_SZ: usize = 512;
pub const DISK_BLOCKS: usize = 128;

/// Stand-in for the kernel task layer. Wakeups are recorded; a task that
/// goes to sleep waiting for free pages gets the reclaimer run on its
/// behalf, which is exactly the bargain the real memory daemon offers.
pub struct KernelStub {
    wakes: SpinLock<Vec<WaitChannel>>,
    reclaim: Once<Weak<BufferCache>>,
}

impl KernelStub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            wakes: SpinLock::new(Vec::new()),
            reclaim: Once::new(),
        })
    }

    pub fn wire_reclaim(&self, buffers: &Arc<BufferCache>) {
        self.reclaim.call_once(|| Arc::downgrade(buffers));
    }

    pub fn woke(&self, chan: WaitChannel) -> bool {
        self.wakes.lock().contains(&chan)
    }
}

impl TaskOps for KernelStub {
    fn sleep(&self, chan: WaitChannel) {
        if chan == WaitChannel::FreePage {
            if let Some(buffers) = self.reclaim.get().and_then(Weak::upgrade) {
                buffers.reclaim_buffers();
            }
        }
    }

    fn wakeup(&self, chan: WaitChannel) {
        self.wakes.lock().push(chan);
    }

    fn now(&self) -> TimeSpec {
        TimeSpec::new(1_000, 0)
    }
}

/// RAM disk that counts transfers and can fail reads on demand.
pub struct CountingDisk {
    ram: Arc<RamBlock>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
}

impl CountingDisk {
    pub fn new(dev_id: DevId, nblocks: usize, block_size: usize) -> Arc<Self> {
        Arc::new(Self {
            ram: RamBlock::new(dev_id, "ram0", nblocks, block_size),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn snapshot(&self, block: usize) -> Vec<u8> {
        self.ram.snapshot(block)
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

struct StderrSink;

impl logger::LogSink for StderrSink {
    fn write(&self, record: &log::Record) {
        eprintln!("[{:>5}] {}", record.level(), record.args());
    }
}

static STDERR_SINK: StderrSink = StderrSink;

pub struct Harness {
    pub sched: Arc<KernelStub>,
    pub pages: Arc<PageCache>,
    pub buffers: Arc<BufferCache>,
    pub disk: Arc<CountingDisk>,
    pub fs: Arc<SimpleFs>,
}

pub fn setup(nr_bufs: usize, nr_pages: usize) -> Harness {
    logger::init();
    logger::register_sink(&STDERR_SINK);

    let sched = KernelStub::new();
    let pages = Arc::new(PageCache::new(nr_pages, 16, sched.clone()).unwrap());
    let devices = Arc::new(DeviceManager::new());
    let disk = CountingDisk::new(DEV, DISK_BLOCKS, BLK_SZ);
    devices.register(disk.clone());
    let buffers = Arc::new(BufferCache::new(
        nr_bufs,
        16,
        devices,
        pages.clone(),
        sched.clone(),
    ));
    sched.wire_reclaim(&buffers);
    let fs = SimpleFs::new(DEV, BLK_SZ, DISK_BLOCKS, sched.clone());

    Harness {
        sched,
        pages,
        buffers,
        disk,
        fs,
    }
}

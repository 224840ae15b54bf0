#![no_std]

pub mod mutex;

pub use mutex::{MutexSupport, Spin, SpinLock, SpinNoIrq, SpinNoIrqLock};

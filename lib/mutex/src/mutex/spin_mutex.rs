use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use super::MutexSupport;

// Critical sections under these locks are a handful of list and flag
// operations. A spin that runs this deep means a guard leaked or its holder
// went to sleep, and aborting beats hanging the machine silently.
const SPIN_WATCHDOG: usize = 1 << 26;

/// A busy-waiting mutual-exclusion lock.
///
/// The data lives inside the lock and is reachable only through a
/// [`MutexGuard`], so "forgot to unlock" is not expressible. `S` decides
/// what wraps the critical section: nothing for plain spinning, an
/// interrupt mask on builds that have one.
pub struct SpinMutex<T: ?Sized, S: MutexSupport> {
    locked: AtomicBool,
    _support: PhantomData<S>,
    data: UnsafeCell<T>,
}

/// Exclusive access to the contents of a [`SpinMutex`]; unlocks on drop.
pub struct MutexGuard<'a, T: ?Sized, S: MutexSupport> {
    owner: &'a SpinMutex<T, S>,
    hook: S::GuardData,
    // A guard stays with the task that took it; handing one to another
    // task would let a non-owner release the lock.
    _pinned: PhantomData<*mut ()>,
}

unsafe impl<T: ?Sized + Send, S: MutexSupport> Send for SpinMutex<T, S> {}
unsafe impl<T: ?Sized + Send, S: MutexSupport> Sync for SpinMutex<T, S> {}

impl<T, S: MutexSupport> SpinMutex<T, S> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            _support: PhantomData,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized, S: MutexSupport> SpinMutex<T, S> {
    /// Takes the lock in a single attempt, or reports it busy.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, S>> {
        let hook = S::before_lock();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(MutexGuard {
                owner: self,
                hook,
                _pinned: PhantomData,
            })
        } else {
            None
        }
    }

    /// Spins until the lock is taken.
    ///
    /// Acquisition races with a weak compare-exchange and waits out
    /// contention on plain loads, so the cache line is not hammered with
    /// writes. A watchdog counts the waiting; blowing through it panics.
    pub fn lock(&self) -> MutexGuard<'_, T, S> {
        let hook = S::before_lock();
        let mut waited = 0usize;
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return MutexGuard {
                    owner: self,
                    hook,
                    _pinned: PhantomData,
                };
            }
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
                waited += 1;
                if waited == SPIN_WATCHDOG {
                    log::error!("[SpinMutex::lock] still contended after {} spins", waited);
                    panic!("spinlock watchdog: holder never released the lock");
                }
            }
        }
    }
}

impl<T: ?Sized, S: MutexSupport> Deref for MutexGuard<'_, T, S> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { &*self.owner.data.get() }
    }
}

impl<T: ?Sized, S: MutexSupport> DerefMut for MutexGuard<'_, T, S> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.owner.data.get() }
    }
}

impl<T: ?Sized, S: MutexSupport> Drop for MutexGuard<'_, T, S> {
    #[inline(always)]
    fn drop(&mut self) {
        self.owner.locked.store(false, Ordering::Release);
        S::after_unlock(&mut self.hook);
    }
}

use self::spin_mutex::SpinMutex;

pub mod spin_mutex;

pub type SpinLock<T> = SpinMutex<T, Spin>;
pub type SpinNoIrqLock<T> = SpinMutex<T, SpinNoIrq>;

/// Hook run around a lock's critical section.
///
/// `before_lock` runs ahead of the first acquisition attempt and whatever
/// it returns rides inside the guard; `after_unlock` runs once the lock bit
/// is clear again. Keeping lock types generic over this lets the same code
/// serve a hosted build and a kernel build that masks interrupts.
pub trait MutexSupport {
    type GuardData;
    fn before_lock() -> Self::GuardData;
    fn after_unlock(_: &mut Self::GuardData);
}

/// Plain spinning; the hook does nothing.
#[derive(Debug)]
pub struct Spin;

impl MutexSupport for Spin {
    type GuardData = ();
    #[inline(always)]
    fn before_lock() -> Self::GuardData {}
    #[inline(always)]
    fn after_unlock(_: &mut Self::GuardData) {}
}

/// Spinning for sections that a kernel build would also shield from
/// interrupts. This workspace has no architecture layer, so the mask hook
/// is empty and the lock bit alone provides the "no preemption, no other
/// CPU inside" guarantee; the sections it protects stay short and never
/// block.
#[derive(Debug)]
pub struct SpinNoIrq;

impl MutexSupport for SpinNoIrq {
    type GuardData = ();
    #[inline(always)]
    fn before_lock() -> Self::GuardData {}
    #[inline(always)]
    fn after_unlock(_: &mut Self::GuardData) {}
}

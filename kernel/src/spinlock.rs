//! Mutual exclusion for the kernel's process-wide singletons.
//!
//! Per spec §5, this kernel never preempts inside ring 0 and is single-CPU,
//! so a bare spinlock never actually spins against another *core* — it only
//! ever contends against an interrupt handler on the same core. `SpinLock`
//! is the plain version; `SpinLockIrq` additionally disables interrupts for
//! the lock's lifetime, which is what every resource listed in §5 ("frame
//! allocator, fd table, VFS mount list, vnode caches, process list, IDT, PIC
//! registers") is guarded by.

use crate::arch;
use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
        SpinLockGuard { lock: self }
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// A spinlock held with interrupts disabled for its whole lifetime.
///
/// Used for state that an ISR might also need to touch (the IDT's ISR
/// table, the PIC mask registers, the frame allocator bitmap) so that a
/// lock holder can never be interrupted into code that re-enters the lock.
pub struct SpinLockIrq<T> {
    inner: SpinLock<T>,
}

unsafe impl<T: Send> Sync for SpinLockIrq<T> {}
unsafe impl<T: Send> Send for SpinLockIrq<T> {}

impl<T> SpinLockIrq<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: SpinLock::new(data),
        }
    }

    pub fn lock(&self) -> SpinLockIrqGuard<'_, T> {
        let were_enabled = arch::cpu::interrupts_enabled();
        unsafe {
            arch::cpu::disable_interrupts();
        }
        let guard = core::mem::ManuallyDrop::new(self.inner.lock());
        SpinLockIrqGuard {
            guard,
            were_enabled,
        }
    }
}

pub struct SpinLockIrqGuard<'a, T> {
    guard: core::mem::ManuallyDrop<SpinLockGuard<'a, T>>,
    were_enabled: bool,
}

impl<'a, T> Deref for SpinLockIrqGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T> DerefMut for SpinLockIrqGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<'a, T> Drop for SpinLockIrqGuard<'a, T> {
    fn drop(&mut self) {
        unsafe {
            core::mem::ManuallyDrop::drop(&mut self.guard);
        }
        if self.were_enabled {
            unsafe {
                arch::cpu::enable_interrupts();
            }
        }
    }
}

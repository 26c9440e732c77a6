//! Basic CPU control: interrupt gating and halt.
//!
//! Design note §9, open question 1: the original source's
//! `cpu_enable_irqs`/`cpu_disable_irqs` pair had names that disagreed with
//! their `sti`/`cli` bodies. We follow the asm, not the name that was
//! attached to it — `disable_interrupts` always lowers to `cli`,
//! `enable_interrupts` always lowers to `sti`, regardless of what a caller
//! might assume from elsewhere in the tree.

use core::arch::asm;
use core::sync::atomic::{AtomicBool, Ordering};

static IRQS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Disable maskable interrupts. Every ring-0 entry point calls this before
/// touching a process-wide singleton (§5).
///
/// # Safety
/// Must only be lifted by a matching `enable_interrupts` once any protected
/// state has been released.
#[inline]
pub unsafe fn disable_interrupts() {
    asm!("cli", options(nomem, nostack, preserves_flags));
    IRQS_ENABLED.store(false, Ordering::SeqCst);
}

/// Enable maskable interrupts. Only safe to call when about to `iret` into
/// ring 3, or at an explicit wait point (§5).
///
/// # Safety
/// Caller must have already released any lock the interrupted context could
/// re-enter.
#[inline]
pub unsafe fn enable_interrupts() {
    IRQS_ENABLED.store(true, Ordering::SeqCst);
    asm!("sti", options(nomem, nostack, preserves_flags));
}

pub fn interrupts_enabled() -> bool {
    IRQS_ENABLED.load(Ordering::SeqCst)
}

/// Halt until the next interrupt.
#[inline]
pub fn halt() {
    unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
}

pub fn halt_loop() -> ! {
    loop {
        halt();
    }
}

//! Timer IRQ handler (spec §2 item 8, §4.6b): PIT channel 0 wired to
//! IRQ0, driving the round-robin scheduler's quantum.

use super::TrapFrame;
use crate::arch::x86::constants::PIC1_VECTOR_BASE;
use crate::arch::x86::{pit, X86Pic};
use crate::sched;
use core::sync::atomic::{AtomicU64, Ordering};

/// IRQ0 lands at the master PIC's vector base after remap (spec §4.5).
pub const IRQ_VECTOR: u8 = PIC1_VECTOR_BASE;

/// Ticks since `init_hardware`, used by hardware-probe timeouts (spec
/// §4.10/§4.11's "200 ms"/"50 ms" bounds) that have no other clock to poll.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Program the PIT to `config::TIMER_HZ`. Called once from
/// `interrupts::init` after the vector is registered, before IRQ0 is
/// unmasked.
pub fn init_hardware() {
    pit::set_frequency(crate::config::TIMER_HZ as u32);
}

/// EOI first: the scheduler tick this drives may switch away and not
/// return here until this same process is rescheduled, possibly much
/// later. Acknowledging after the switch would leave IRQ0 stalled at the
/// PIC for every other process in the meantime.
pub fn handler(frame: &mut TrapFrame) {
    X86Pic::send_eoi(frame.vector as u8);
    TICKS.fetch_add(1, Ordering::Relaxed);
    sched::tick();
}

/// Milliseconds elapsed since the PIT started, rounded down to whole
/// ticks. Used to bound busy-wait polling loops in device probes.
pub fn millis() -> u64 {
    TICKS.load(Ordering::Relaxed) * 1000 / crate::config::TIMER_HZ as u64
}

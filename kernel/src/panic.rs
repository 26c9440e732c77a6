//! Kernel panic handling (spec §3 "+ Kernel panic/log record").
//!
//! A `PanicInfo`-sourced single-line record is written to every registered
//! sink before halting, going through the sink multiplexer instead of a
//! single hardcoded writer.

use core::panic::PanicInfo;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    unsafe {
        crate::arch::cpu::disable_interrupts();
    }
    crate::kprintln!("kernel panic: {}", info);
    log::error!("kernel panic: {}", info);
    crate::arch::cpu::halt_loop()
}

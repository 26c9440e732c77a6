//! Concrete 32-bit x86 (IA-32, PAE) implementation of the `arch` traits.
//!
//! One file per hardware facility, re-exported as a flat set of
//! zero-sized marker types implementing the traits in `arch::traits`.

pub mod constants;
pub mod context_switch;
pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod io;
pub mod msr;
pub mod pic;
pub mod pit;
pub mod registers;
pub mod tlb;
pub mod trampolines;

pub use io::X86Io;
pub use msr::X86Msr;
pub use pic::X86Pic;
pub use registers::X86Registers;
pub use tlb::X86Tlb;

/// Bring up segmentation, the interrupt table, and the PIC, in the order
/// each depends on the last: the IDT's code-segment selector must already
/// be valid before `idt::init` builds gate descriptors, and the PIC must
/// be remapped off vectors 8-15 before interrupts are ever unmasked.
///
/// # Safety
/// Must run exactly once, early in boot, with interrupts still disabled.
pub unsafe fn init(kernel_stack_top: u32) {
    gdt::init(kernel_stack_top);
    idt::init();
    <X86Pic as crate::arch::traits::InterruptController>::init();
}

//! Bridge to the build-time-generated per-vector interrupt trampolines.
//!
//! Spec §9 asks for "a distinct entry point per vector" without mandating
//! hand-written assembly for all 256. A `for` loop can't emit 256 naked
//! `#[naked]` functions in stable Rust, so `build.rs` emits the trampoline
//! assembly text itself (looping 0..256 at build time instead of at
//! compile time) and assembles it with the `cc` crate. Each trampoline
//! pushes a dummy error code (for vectors that don't push one natively),
//! pushes its own vector number, and jumps to `common_interrupt_tail`,
//! which is still hand-written in `interrupt_tail.asm` since it's one
//! routine instead of 256. A declarative macro could generate one stub
//! per vector the same way, but `macro_rules!` still can't produce 256
//! distinct `#[naked] extern "C"` items without enormous manual
//! enumeration, hence the build-time text generator instead.

extern "C" {
    /// Emitted by the generated trampoline object: 256 32-bit code
    /// addresses, index == vector number.
    static TRAMPOLINE_TABLE: [u32; super::idt::ENTRY_COUNT];
}

/// Address of the trampoline for `vector`, for use as an IDT gate target.
pub fn address_of(vector: u8) -> u32 {
    unsafe { TRAMPOLINE_TABLE[vector as usize] }
}

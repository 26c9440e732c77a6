//! 256-entry IDT construction (spec §4.0, §9).
//!
//! The trampoline bodies themselves are generated at build time (one push
//! of the vector number plus a jump to a common tail, per vector — see
//! `build.rs` and `trampolines.rs`); this module only encodes the 8-byte
//! gate descriptors that point at them and loads the table with `lidt`.

use core::arch::asm;
use core::mem::size_of;
use conquer_once::spin::OnceCell;

use super::gdt::selector;
use crate::arch::traits::Ring;

const GATE_INTERRUPT32: u8 = 0x0E;
const PRESENT: u8 = 0x80;
const DPL0: u8 = 0 << 5;
const DPL3: u8 = 3 << 5;

#[derive(Clone, Copy)]
#[repr(C)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, gate_type: u8, dpl: u8) -> Self {
        IdtEntry {
            offset_low: (handler & 0xFFFF) as u16,
            selector: selector::KERNEL_CODE,
            zero: 0,
            type_attr: PRESENT | dpl | gate_type,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

pub const ENTRY_COUNT: usize = 256;

#[repr(C, align(8))]
struct Idt([IdtEntry; ENTRY_COUNT]);

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

static IDT: OnceCell<Idt> = OnceCell::uninit();

/// Build the IDT from the build-time-generated per-vector trampoline table
/// and load it with `lidt`.
///
/// Every gate starts DPL0 except vector 0x80 (syscall, spec §4.13), which
/// needs DPL3 since it's entered by an explicit ring-3 `int 0x80`. The IDT
/// DPL check only applies to software `int n`; CPU-raised exceptions
/// (breakpoint, overflow, general protection) reach their handler
/// regardless of gate DPL even when triggered from ring 3, so those stay
/// DPL0-only here. `interrupts::register_trap_isr` can still widen a
/// vector's gate to DPL3 later via `set_gate_dpl`, for a trap meant to be
/// reachable through `int n` from userspace.
pub fn init() {
    let idt = IDT.init_once(|| {
        let mut entries = [IdtEntry::missing(); ENTRY_COUNT];
        for (vector, entry) in entries.iter_mut().enumerate() {
            let handler = super::trampolines::address_of(vector as u8);
            let dpl = if vector == 0x80 { DPL3 } else { DPL0 };
            *entry = IdtEntry::new(handler, GATE_INTERRUPT32, dpl);
        }
        Idt(entries)
    });

    let pointer = DescriptorTablePointer {
        limit: (size_of::<Idt>() - 1) as u16,
        base: idt as *const _ as u32,
    };

    unsafe {
        asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
    }
}

/// Set vector `vector`'s gate DPL to match `ring` (spec §4.5
/// "Registration"). The CPU reads the IDT live off the address `lidt`
/// already pointed it at, so this takes effect on the very next interrupt
/// with no reload needed.
pub fn set_gate_dpl(vector: u8, ring: Ring) {
    let idt = IDT.get().expect("idt not initialized");
    let dpl = if ring.is_user() { DPL3 } else { DPL0 };
    let entry = &idt.0[vector as usize] as *const IdtEntry as *mut IdtEntry;
    unsafe {
        (*entry).type_attr = PRESENT | dpl | GATE_INTERRUPT32;
    }
}

//! Architecture-fixed numeric constants shared across the `arch::x86`
//! submodules. Kept separate from `memory::layout` (which holds the
//! kernel's own address-space layout choices, spec §4.2) — these are
//! properties of the ISA itself, not of this kernel's design.

/// Vector at which the master PIC's IRQ0 lands after remap (spec §4.5).
pub const PIC1_VECTOR_BASE: u8 = super::pic::PIC1_OFFSET;
/// Vector at which the slave PIC's IRQ8 lands after remap.
pub const PIC2_VECTOR_BASE: u8 = super::pic::PIC2_OFFSET;

/// Syscall gate vector (spec §4.13).
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Page fault vector (spec §4.3).
pub const PAGE_FAULT_VECTOR: u8 = 14;
/// General protection fault vector.
pub const GP_FAULT_VECTOR: u8 = 13;
/// Double fault vector.
pub const DOUBLE_FAULT_VECTOR: u8 = 8;

/// IA-32 page size (PAE and non-PAE agree on the base 4 KiB page).
pub const PAGE_SIZE: u32 = 4096;
pub const PAGE_SHIFT: u32 = 12;

/// PAE page-table geometry: 512 entries per table at every level, 8-byte
/// entries (spec §3 "3-level PAE paging").
pub const PAE_ENTRIES_PER_TABLE: usize = 512;
pub const PDPT_ENTRIES: usize = 4;

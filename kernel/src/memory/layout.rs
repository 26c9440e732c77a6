//! Kernel address-space layout (spec §4.2 "Paging Manager").
//!
//! Single-CPU, single address width (32-bit + PAE): there's one kernel
//! stack, one running process at a time from the scheduler's
//! perspective, and no per-CPU stack region to reserve. Kept as a
//! distinct module from
//! `arch::x86::constants` because these are *this kernel's* design
//! choices, not properties of the ISA.

use crate::arch::x86::constants::PAGE_SIZE;

/// Kernel image physical load address (spec §6 boot contract: "loaded at
/// its ELF-linked physical address").
pub const KERNEL_PHYS_BASE: u32 = 0x0010_0000;

/// High-half virtual base the kernel image is aliased at (spec §6: paging
/// already enabled, "kernel image identity-mapped and aliased at its high
/// virtual base").
pub const KERNEL_VIRT_BASE: u32 = 0xC000_0000;

/// Kernel heap virtual range (spec §4.4 "real heap"); lazily backed by
/// the page-fault arbiter (spec §4.3 "absent | kernel heap").
pub const KERNEL_HEAP_START: u32 = 0xD000_0000;
pub const KERNEL_HEAP_SIZE: u32 = crate::config::KERNEL_HEAP_SIZE as u32;
pub const KERNEL_HEAP_END: u32 = KERNEL_HEAP_START + KERNEL_HEAP_SIZE;

/// User half of every address space (spec §4.2 "zero user half"): the low
/// 3 GiB, below `KERNEL_VIRT_BASE`.
pub const USER_SPACE_END: u32 = KERNEL_VIRT_BASE;

/// Highest address a user stack may occupy; processes' stacks are
/// allocated just below this (spec §4.6 "PROC_HIGH_ADDRESS − PAGESIZE").
pub const PROC_HIGH_ADDRESS: u32 = USER_SPACE_END;

/// User stack span, in pages (spec §4.6 "PROC_STACK_PAGESPAN").
pub const PROC_STACK_PAGESPAN: u32 = (crate::config::USER_STACK_SIZE as u32) / PAGE_SIZE;

/// Kernel stack size per process (spec §4.6 "PROC_KSTACK_SIZE"), allocated
/// out of `kmalloc`.
pub const PROC_KSTACK_SIZE: usize = crate::config::KERNEL_STACK_SIZE as usize;

/// Static boot stack used before the first process exists; its top is
/// what `gdt::init` first installs into `TSS.esp0`.
#[repr(align(16))]
struct BootStack([u8; PROC_KSTACK_SIZE]);

static mut BOOT_STACK: BootStack = BootStack([0; PROC_KSTACK_SIZE]);

pub fn initial_kernel_stack_top() -> u32 {
    #[allow(static_mut_refs)]
    unsafe {
        (BOOT_STACK.0.as_ptr() as u32) + PROC_KSTACK_SIZE as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_range_is_below_kernel_image_alias_and_page_aligned() {
        assert!(KERNEL_HEAP_START >= KERNEL_VIRT_BASE);
        assert_eq!(KERNEL_HEAP_START % PAGE_SIZE, 0);
        assert_eq!(KERNEL_HEAP_SIZE % PAGE_SIZE, 0);
    }

    #[test]
    fn proc_stack_fits_below_user_ceiling() {
        assert!(PROC_STACK_PAGESPAN > 0);
        assert!(PROC_HIGH_ADDRESS <= USER_SPACE_END);
    }
}

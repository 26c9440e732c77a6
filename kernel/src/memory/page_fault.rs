//! Page-fault arbiter (spec §4.3): the single decision point every #PF
//! routes through, whatever triggered it.
//!
//! Follows the spec's decision table directly: `log::error!` then
//! `panic!` for every unrecoverable case, never a silent `unwrap`.

use crate::arch::traits::Ring;
use crate::arch::x86::constants::PAGE_SIZE;
use crate::memory::frame_allocator;
use crate::memory::layout::{KERNEL_HEAP_END, KERNEL_HEAP_START, KERNEL_VIRT_BASE};
use crate::memory::paging::PageFlags;
use crate::useraccess;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    Absent,
    Protection,
}

/// Resolve a page fault and return the ip the CPU should resume at.
///
/// `kernel_ps` is the kernel's own paging structure (faults in ring 0
/// only ever concern the kernel's mappings; a process's own structure
/// always has the kernel aliased in via `map_kernel_into`, so the two
/// agree on every kernel-space entry).
pub fn handle(
    fault_va: u32,
    fault_ip: u32,
    ring: Ring,
    reason: FaultReason,
    kernel_ps: &crate::memory::paging::PagingStruct,
) -> u32 {
    if ring.is_user() {
        // Non-goal for this kernel's first cut (spec §4.3 row 6): no
        // process signal delivery yet.
        panic!(
            "user-mode page fault: va={:#x} ip={:#x} (signal delivery not implemented)",
            fault_va, fault_ip
        );
    }

    match reason {
        FaultReason::Protection => {
            if useraccess::ip_in_useraccess_region(fault_ip) {
                return useraccess::fault_stub_address();
            }
            panic!(
                "ring 0 protection fault: ip={:#x} va={:#x}",
                fault_ip, fault_va
            );
        }
        FaultReason::Absent => {
            if fault_va >= KERNEL_HEAP_START && fault_va < KERNEL_HEAP_END {
                let page_va = fault_va & !(PAGE_SIZE - 1);
                let pa = page_va - KERNEL_VIRT_BASE;
                frame_allocator::falloc_one_at(pa).unwrap_or_else(|_| {
                    panic!("Kernel out of memory");
                });
                kernel_ps.map_page(page_va, pa, PageFlags::PRESENT | PageFlags::WRITABLE);
                unsafe {
                    core::ptr::write_bytes(page_va as *mut u8, 0, PAGE_SIZE as usize);
                }
                return fault_ip;
            }
            if fault_va < PAGE_SIZE {
                panic!("NULL in ring 0");
            }
            panic!("Kernel tried mapping weird page: va={:#x}", fault_va);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_range_bounds_are_page_aligned() {
        assert_eq!(KERNEL_HEAP_START % PAGE_SIZE, 0);
        assert_eq!(KERNEL_HEAP_END % PAGE_SIZE, 0);
    }
}

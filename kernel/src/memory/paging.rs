//! PAE 3-level paging manager (spec §4.2).
//!
//! Virtual address breakdown for 32-bit PAE: `[31:30]` PDPT index (4
//! entries), `[29:21]` page-directory index (512 entries), `[20:12]` page-
//! table index (512 entries), `[11:0]` page offset. Every table entry is
//! 8 bytes (PAE widens physical addresses to 36 bits).
//!
//! The 3-level PAE structure this spec mandates is re-implemented over
//! raw `u64` entries, since no crate on this target models PAE tables
//! for us.
//!
//! **Open question resolution (physical-memory window):** writing a
//! newly allocated page-table frame requires a virtual address for it.
//! Rather than invent an ad hoc per-table temporary mapping, this kernel
//! follows the common small-kernel convention (xv6 and peers) of mapping
//! all physical memory below `PHYS_MAP_CEILING` at a fixed offset from
//! `KERNEL_VIRT_BASE` as part of `map_kernel_into` — a direct
//! generalization of "alias the kernel's high half" to "alias all
//! low physical memory the kernel might need to reach".

use crate::arch::traits::{ControlRegisterOps, PageFlags as PageFlagsTrait, TlbOps};
use crate::arch::x86::constants::{PAE_ENTRIES_PER_TABLE, PAGE_SHIFT, PAGE_SIZE, PDPT_ENTRIES};
use crate::arch::x86::registers::{cr0, cr4, X86Registers};
use crate::arch::x86::X86Tlb;
use crate::memory::frame_allocator;
use crate::memory::layout::KERNEL_VIRT_BASE;
use alloc::vec::Vec;
use bitflags::bitflags;

/// Upper bound of the identity-ish physical window aliased at
/// `KERNEL_VIRT_BASE` (see module docs). 256 MiB comfortably covers the
/// kernel image, the bootstrap heap, and every page-table frame this
/// kernel allocates for itself.
pub const PHYS_MAP_CEILING: u32 = 0x1000_0000;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT      = 1 << 0;
        const WRITABLE     = 1 << 1;
        const USER         = 1 << 2;
        const NO_EXECUTE   = 1 << 63;
    }
}

impl PageFlagsTrait for PageFlags {
    fn empty() -> Self {
        PageFlags::empty()
    }
    fn present() -> Self {
        PageFlags::PRESENT
    }
    fn writable() -> Self {
        PageFlags::WRITABLE
    }
    fn user_accessible() -> Self {
        PageFlags::USER
    }
    fn no_execute() -> Self {
        PageFlags::NO_EXECUTE
    }
    fn or(self, other: Self) -> Self {
        self | other
    }
    fn contains(&self, other: Self) -> bool {
        PageFlags::contains(self, other)
    }
    fn without(self, other: Self) -> Self {
        self & !other
    }
}

const ADDR_MASK: u64 = 0x0000_000F_FFFF_F000;

fn phys_to_virt(pa: u32) -> u32 {
    debug_assert!(pa < PHYS_MAP_CEILING);
    KERNEL_VIRT_BASE + pa
}

fn table_ptr(pa: u32) -> *mut u64 {
    phys_to_virt(pa) as *mut u64
}

fn alloc_zeroed_table() -> u32 {
    let pa = frame_allocator::falloc_one();
    assert_ne!(pa, 0, "out of memory allocating page table");
    unsafe {
        core::ptr::write_bytes(table_ptr(pa), 0, PAGE_SIZE as usize);
    }
    pa
}

/// A process (or the kernel's own) paging structure: the physical address
/// of its 4-entry PDPT, and the list of user frames it owns so
/// `destroy_paging_struct` can free them.
pub struct PagingStruct {
    pdpt_phys: u32,
    user_frames: Vec<u32>,
}

fn indices(va: u32) -> (usize, usize, usize) {
    let pdpt_i = (va >> 30) as usize & (PDPT_ENTRIES - 1);
    let pd_i = (va >> 21) as usize & (PAE_ENTRIES_PER_TABLE - 1);
    let pt_i = (va >> PAGE_SHIFT) as usize & (PAE_ENTRIES_PER_TABLE - 1);
    (pdpt_i, pd_i, pt_i)
}

impl PagingStruct {
    /// `init_paging_struct` (spec §4.2): allocate the top-level structure.
    /// A fresh PDPT is entirely zero, so the user half starts empty for
    /// free.
    pub fn new() -> Self {
        let pdpt_phys = alloc_zeroed_table();
        PagingStruct {
            pdpt_phys,
            user_frames: Vec::new(),
        }
    }

    pub fn phys_addr(&self) -> u32 {
        self.pdpt_phys
    }

    fn pdpt(&self) -> *mut u64 {
        table_ptr(self.pdpt_phys)
    }

    fn ensure_pd(&self, pdpt_i: usize) -> *mut u64 {
        unsafe {
            let entry = self.pdpt().add(pdpt_i);
            if entry.read() & PageFlags::PRESENT.bits() == 0 {
                let pd_phys = alloc_zeroed_table();
                entry.write(
                    (pd_phys as u64 & ADDR_MASK)
                        | PageFlags::PRESENT.bits()
                        | PageFlags::WRITABLE.bits(),
                );
            }
            table_ptr((entry.read() & ADDR_MASK) as u32)
        }
    }

    fn ensure_pt(&self, pd: *mut u64, pd_i: usize) -> *mut u64 {
        unsafe {
            let entry = pd.add(pd_i);
            if entry.read() & PageFlags::PRESENT.bits() == 0 {
                let pt_phys = alloc_zeroed_table();
                entry.write(
                    (pt_phys as u64 & ADDR_MASK)
                        | PageFlags::PRESENT.bits()
                        | PageFlags::WRITABLE.bits(),
                );
            }
            table_ptr((entry.read() & ADDR_MASK) as u32)
        }
    }

    /// `map_page` (spec §4.2): allocate intermediate tables on demand,
    /// install the mapping, flush the one affected TLB entry.
    pub fn map_page(&self, va: u32, pa: u32, flags: PageFlags) {
        let (pdpt_i, pd_i, pt_i) = indices(va);
        let pd = self.ensure_pd(pdpt_i);
        let pt = self.ensure_pt(pd, pd_i);
        unsafe {
            pt.add(pt_i)
                .write((pa as u64 & ADDR_MASK) | flags.bits() | PageFlags::PRESENT.bits());
        }
        X86Tlb::flush_page(va);
    }

    /// `new_user_page` (spec §4.2): allocate a user-zone frame, map it
    /// with `USER` forced on, and track it for teardown.
    pub fn new_user_page(&mut self, va: u32, flags: PageFlags) -> u32 {
        let pa = frame_allocator::falloc_one_user();
        assert_ne!(pa, 0, "out of memory allocating user page");
        self.map_page(va, pa, flags.or(PageFlags::USER));
        self.user_frames.push(pa);
        pa
    }

    fn pte_for(&self, va: u32) -> Option<*mut u64> {
        let (pdpt_i, pd_i, pt_i) = indices(va);
        unsafe {
            let pdpt_entry = self.pdpt().add(pdpt_i).read();
            if pdpt_entry & PageFlags::PRESENT.bits() == 0 {
                return None;
            }
            let pd = table_ptr((pdpt_entry & ADDR_MASK) as u32);
            let pd_entry = pd.add(pd_i).read();
            if pd_entry & PageFlags::PRESENT.bits() == 0 {
                return None;
            }
            let pt = table_ptr((pd_entry & ADDR_MASK) as u32);
            let pte = pt.add(pt_i);
            if pte.read() & PageFlags::PRESENT.bits() == 0 {
                return None;
            }
            Some(pte)
        }
    }

    /// `set_page_flags` (spec §4.2): OR flags into the existing PTE.
    pub fn set_page_flags(&self, va: u32, flags: PageFlags) {
        if let Some(pte) = self.pte_for(va) {
            unsafe {
                let current = pte.read();
                pte.write(current | flags.bits());
            }
            X86Tlb::flush_page(va);
        }
    }

    /// `rm_page_flags` (spec §4.2): clear flags from the existing PTE.
    pub fn rm_page_flags(&self, va: u32, flags: PageFlags) {
        if let Some(pte) = self.pte_for(va) {
            unsafe {
                let current = pte.read();
                pte.write(current & !flags.bits());
            }
            X86Tlb::flush_page(va);
        }
    }

    /// `va→pa` (spec §4.2): walk the structure, 0 if unmapped.
    pub fn translate(&self, va: u32) -> u32 {
        match self.pte_for(va) {
            Some(pte) => unsafe { (pte.read() & ADDR_MASK) as u32 },
            None => 0,
        }
    }

    /// `destroy_paging_struct` (spec §4.2): free every tracked user frame
    /// and every intermediate table this structure owns. The kernel's own
    /// structure is never destroyed, so this is only ever called for
    /// process address spaces.
    pub fn destroy(&mut self) {
        for &pa in &self.user_frames {
            frame_allocator::ffree_one(pa);
        }
        self.user_frames.clear();

        unsafe {
            for pdpt_i in 0..PDPT_ENTRIES {
                let pdpt_entry = self.pdpt().add(pdpt_i).read();
                if pdpt_entry & PageFlags::PRESENT.bits() == 0 {
                    continue;
                }
                let pd_phys = (pdpt_entry & ADDR_MASK) as u32;
                let pd = table_ptr(pd_phys);
                for pd_i in 0..PAE_ENTRIES_PER_TABLE {
                    let pd_entry = pd.add(pd_i).read();
                    if pd_entry & PageFlags::PRESENT.bits() != 0 {
                        frame_allocator::ffree_one((pd_entry & ADDR_MASK) as u32);
                    }
                }
                frame_allocator::ffree_one(pd_phys);
            }
        }
        frame_allocator::ffree_one(self.pdpt_phys);
    }

    /// `map_kernel_into` (spec §4.2): alias the kernel high half — and,
    /// per this module's Open Question resolution, all of low physical
    /// memory up to `PHYS_MAP_CEILING` — into `ps`.
    pub fn map_kernel_into(&self) {
        let mut pa = 0u32;
        while pa < PHYS_MAP_CEILING {
            self.map_page(
                KERNEL_VIRT_BASE + pa,
                pa,
                PageFlags::PRESENT.or(PageFlags::WRITABLE),
            );
            pa += PAGE_SIZE;
        }
    }

    /// Install this structure as the active one by loading CR3.
    ///
    /// # Safety
    /// Must only be called with a structure that has `map_kernel_into`
    /// applied, so the instruction stream stays mapped across the switch.
    pub unsafe fn activate(&self) {
        X86Registers::write_cr3(self.pdpt_phys);
    }

    /// Kernel-section enforcement (spec §4.2): walk the named kernel ELF
    /// sections `linker.ld` lays out and tighten their page permissions
    /// beyond whatever `map_kernel_into`'s blanket `PRESENT|WRITABLE`
    /// aliasing gave them. Called once, right after the kernel's own
    /// structure is installed and active — every address below touches
    /// the kernel's own high-half mapping, not a process's.
    pub fn enforce_kernel_sections(&self) {
        self.clear_flags_over(kernel_sections::bootloader(), PageFlags::PRESENT);

        for range in [
            kernel_sections::text(),
            kernel_sections::syscalls(),
            kernel_sections::useraccess(),
            kernel_sections::init(),
            kernel_sections::rodata(),
            kernel_sections::ksyms(),
        ] {
            self.clear_flags_over(range, PageFlags::WRITABLE);
        }

        for range in [
            kernel_sections::module(),
            kernel_sections::data(),
            kernel_sections::ro_postinit(),
            kernel_sections::bss(),
            kernel_sections::ksyms(),
            kernel_sections::rodata(),
        ] {
            self.set_flags_over(range, PageFlags::NO_EXECUTE);
        }
    }

    fn clear_flags_over(&self, (start, end): (u32, u32), flags: PageFlags) {
        let mut va = start & !(PAGE_SIZE - 1);
        while va < end {
            self.rm_page_flags(va, flags);
            va += PAGE_SIZE;
        }
    }

    fn set_flags_over(&self, (start, end): (u32, u32), flags: PageFlags) {
        let mut va = start & !(PAGE_SIZE - 1);
        while va < end {
            self.set_page_flags(va, flags);
            va += PAGE_SIZE;
        }
    }
}

/// Boundary symbols `linker.ld` provides for each named kernel section
/// (spec §4.2). One accessor per section rather than a single macro, so
/// the link-time names stay plain `grep`-able strings.
mod kernel_sections {
    macro_rules! accessor {
        ($fn_name:ident, $start:ident, $end:ident) => {
            pub fn $fn_name() -> (u32, u32) {
                extern "C" {
                    static $start: u8;
                    static $end: u8;
                }
                unsafe {
                    (
                        &$start as *const u8 as u32,
                        &$end as *const u8 as u32,
                    )
                }
            }
        };
    }

    accessor!(bootloader, __bootloader_start, __bootloader_end);
    accessor!(text, __text_start, __text_end);
    accessor!(syscalls, __syscalls_start, __syscalls_end);
    accessor!(useraccess, __useraccess_start, __useraccess_end);
    accessor!(init, __init_start, __init_end);
    accessor!(rodata, __rodata_start, __rodata_end);
    accessor!(ksyms, __ksyms_start, __ksyms_end);
    accessor!(module, __module_start, __module_end);
    accessor!(data, __data_start, __data_end);
    accessor!(ro_postinit, __ro_postinit_start, __ro_postinit_end);
    accessor!(bss, __bss_start, __bss_end);
}

/// Enable PAE (CR4) and paging + write-protect (CR0), assuming CR3 already
/// points at a structure with the kernel aliased in.
///
/// # Safety
/// Must run exactly once, with `ps` already installed via `activate`.
pub unsafe fn enable_paging() {
    let cr4_value = X86Registers::read_cr4();
    X86Registers::write_cr4(cr4_value | cr4::PAE);
    let cr0_value = X86Registers::read_cr0();
    X86Registers::write_cr0(cr0_value | cr0::PAGING | cr0::WRITE_PROTECT);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn va_indices_decompose_correctly() {
        let va = (1u32 << 30) | (2u32 << 21) | (3u32 << 12) | 0x45;
        assert_eq!(indices(va), (1, 2, 3));
    }

    #[test]
    fn phys_to_virt_offsets_by_kernel_base() {
        assert_eq!(phys_to_virt(0), KERNEL_VIRT_BASE);
        assert_eq!(phys_to_virt(0x1000), KERNEL_VIRT_BASE + 0x1000);
    }
}

//! TLB maintenance (spec §4.2, §5).

use crate::arch::traits::TlbOps;
use core::arch::asm;

pub struct X86Tlb;

impl TlbOps for X86Tlb {
    #[inline]
    fn flush_page(addr: u32) {
        unsafe {
            asm!("invlpg [{}]", in(reg) addr, options(nostack, preserves_flags));
        }
    }

    #[inline]
    fn flush_all() {
        // Reloading CR3 invalidates every non-global TLB entry.
        use crate::arch::traits::ControlRegisterOps;
        let cr3 = super::registers::X86Registers::read_cr3();
        unsafe { super::registers::X86Registers::write_cr3(cr3) };
    }
}

//! Model-specific register access.

use crate::arch::traits::MsrOps;

pub struct X86Msr;

impl MsrOps for X86Msr {
    #[inline]
    unsafe fn rdmsr(msr: u32) -> u64 {
        x86::msr::rdmsr(msr)
    }

    #[inline]
    unsafe fn wrmsr(msr: u32, value: u64) {
        x86::msr::wrmsr(msr, value)
    }
}

//! User-pointer access helpers (spec §4.3's `user_access_fault_stub`
//! contract, §7's `KError::Fault`).
//!
//! A ring-0 routine may legitimately be asked to dereference a pointer
//! supplied by user space. Rather than validate every such pointer up
//! front (expensive, and still racy against a concurrently unmapped
//! page), this kernel lets the access fault and recovers: every such copy
//! goes through `useraccess_copy` (arch/x86/asm/useraccess.asm), a leaf
//! routine placed in the `.useraccess` section. If it faults, the
//! page-fault arbiter recognizes the faulting ip as lying in that section
//! and patches the resumed ip to `user_access_fault_stub`, which performs
//! the same epilogue the routine's normal exit does — so the call site
//! sees an ordinary `-EFAULT` return instead of a second fault.
//!
//! This fault-recovery idiom is what the spec's page-fault arbiter
//! decision table requires, rather than validating address ranges before
//! every copy.

use crate::errno::KError;

extern "C" {
    fn useraccess_copy(dst: *mut u8, src: *const u8, len: usize) -> i32;
    fn user_access_fault_stub();
    static __useraccess_start: u8;
    static __useraccess_end: u8;
}

/// Address the page-fault arbiter patches a faulting ring-0 ip to, for
/// protection faults whose ip already lands in the `.useraccess` section.
pub fn fault_stub_address() -> u32 {
    user_access_fault_stub as usize as u32
}

/// True if `ip` lies in the `.useraccess` section (spec §4.3 row 1).
pub fn ip_in_useraccess_region(ip: u32) -> bool {
    unsafe {
        let start = &__useraccess_start as *const u8 as u32;
        let end = &__useraccess_end as *const u8 as u32;
        ip >= start && ip < end
    }
}

/// Copy `len` bytes from a user-supplied pointer into a kernel buffer.
///
/// # Safety
/// `dst` must be valid kernel memory for `len` bytes. `src` is untrusted
/// and may fault; that fault is recovered by the page-fault arbiter, not
/// by this function.
pub unsafe fn copy_from_user(dst: *mut u8, src: *const u8, len: usize) -> Result<(), KError> {
    if useraccess_copy(dst, src, len) < 0 {
        Err(KError::Fault)
    } else {
        Ok(())
    }
}

/// Copy `len` bytes from kernel memory into a user-supplied pointer.
///
/// # Safety
/// `src` must be valid kernel memory for `len` bytes. `dst` is untrusted
/// and may fault; recovered the same way as `copy_from_user`.
pub unsafe fn copy_to_user(dst: *mut u8, src: *const u8, len: usize) -> Result<(), KError> {
    if useraccess_copy(dst, src, len) < 0 {
        Err(KError::Fault)
    } else {
        Ok(())
    }
}

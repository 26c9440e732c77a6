//! Syscall dispatch (spec §4.13, §6, §7).
//!
//! One table indexed by syscall number, a dispatch entry point, handlers
//! in their own file. The table itself is generated at build time from
//! `syscalls.defs` by `build.rs`, rather than hand-maintained.

pub mod handlers;

/// A generated table entry: six `u32` arguments straight off the trap
/// frame's general-purpose registers, returning the raw syscall retval
/// (negative = `-errno`, per spec §4.13).
pub type SyscallHandler = fn(u32, u32, u32, u32, u32, u32) -> i32;

include!(concat!(env!("OUT_DIR"), "/syscall_table_generated.rs"));

/// ENOSYS, for numbers with no table entry (spec §6's "sys_undefined
/// stub"). Not part of `KError`'s taxonomy — that enum only covers
/// conditions kernel subsystems themselves can raise, and an unassigned
/// syscall number never reaches one.
const ENOSYS: i32 = -38;

/// `syscall_dispatch(number, a1..a6)` (spec §4.13): the per-entry adapter
/// that forwards the trap frame's six general-purpose argument registers
/// to whichever handler `syscalls.defs` bound to `number`.
pub fn dispatch(number: u32, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32, a6: u32) -> i32 {
    match SYSCALL_TABLE.get(number as usize) {
        Some(Some(handler)) => handler(a1, a2, a3, a4, a5, a6),
        _ => {
            log::warn!("syscall: undefined number {}", number);
            ENOSYS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_number() {
        assert_eq!(name_for(0), Some("exit"));
        assert_eq!(name_for(9), Some("exec"));
        assert_eq!(name_for(SYSCALL_TABLE_LEN), None);
    }

    #[test]
    fn dispatch_of_unassigned_number_is_enosys() {
        assert_eq!(dispatch(SYSCALL_TABLE_LEN as u32, 0, 0, 0, 0, 0, 0), ENOSYS);
    }
}

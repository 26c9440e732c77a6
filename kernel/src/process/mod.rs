//! Process management (spec §4.6 "Process Manager").
//!
//! Re-exports the PCB type, owns a global manager, exposes
//! init/spawn/exit/current_pid. There is only ever one target
//! architecture (32-bit x86), so there's no arch-split here; creation
//! collapses into `manager::spawn` directly — this kernel has no
//! copy-on-write fork (an explicit Non-goal), so there's no second
//! process-creation path to keep distinct from the first.

pub mod manager;
pub mod process;

pub use process::{Process, ProcessId, ProcessState};

pub fn init() {
    manager::init();
}

pub fn current_pid() -> Option<ProcessId> {
    crate::sched::current_pid()
}

pub fn exit_current(exit_code: i32) -> ! {
    manager::exit_current(exit_code)
}

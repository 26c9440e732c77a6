//! Architecture abstraction layer (spec §6: "Architecture-specific details
//! are abstracted behind an arch layer contract").
//!
//! Every other subsystem (paging, interrupts, process, scheduler) talks to
//! the CPU only through the traits declared here. The `x86` submodule is the
//! sole implementation; should this kernel ever grow a second backend, only
//! this module and `x86/` would need to change.

pub mod x86;
pub use x86 as current;

pub mod traits;
pub use traits::*;

/// CPU control primitives used outside the interrupt/paging subsystems
/// proper (idle loop, syscall trap setup).
pub mod cpu {
    pub use super::x86::cpu::{
        disable_interrupts, enable_interrupts, halt, interrupts_enabled,
    };
}

//! Round-robin scheduler (spec §2 item 8, §4.6b "Scheduler", §5
//! "Scheduling model").
//!
//! Built over two primitives: a run queue rotated on timer tick, and an
//! explicit cooperative yield. The actual switch is
//! `arch::x86::context_switch::switch_to` (spec §4.6 "Context switch");
//! a process that has never run is instead routed through
//! `process::manager`'s ring-transition trampoline the first time it's
//! switched into.
//!
//! Single CPU, so `current`/`run_queue` need no cross-core synchronization
//! beyond the usual "IRQs disabled while touched" rule (spec §5).

use crate::arch::traits::ControlRegisterOps;
use crate::arch::x86::{context_switch, gdt, X86Registers};
use crate::config;
use crate::process::manager;
use crate::process::process::ProcessId;
use crate::spinlock::SpinLockIrq;
use alloc::collections::VecDeque;

struct SchedulerState {
    run_queue: VecDeque<ProcessId>,
    current: Option<ProcessId>,
    quantum_remaining: u32,
}

static STATE: SpinLockIrq<SchedulerState> = SpinLockIrq::new(SchedulerState {
    run_queue: VecDeque::new(),
    current: None,
    quantum_remaining: 0,
});

/// Storage for `switch_to`'s `prev_esp_slot` the very first time the
/// scheduler ever hands off — there is no `Process` yet to own it.
static mut BOOT_CTX_ESP: u32 = 0;

/// Scratch storage for a process that is exiting and will never resume;
/// `switch_to` still needs somewhere to write the (meaningless) outgoing
/// stack pointer.
static mut DISCARD_ESP: u32 = 0;

pub fn init() {
    STATE.lock().quantum_remaining = config::SCHED_QUANTUM_TICKS as u32;
    log::info!(
        "sched: round-robin scheduler initialized, quantum={} ticks",
        config::SCHED_QUANTUM_TICKS
    );
}

/// `sched_enqueue` (spec §4.6b): make `pid` runnable.
pub fn enqueue(pid: ProcessId) {
    STATE.lock().run_queue.push_back(pid);
}

pub fn current_pid() -> Option<ProcessId> {
    STATE.lock().current
}

/// Timer-tick hook (spec §4.6b), called from the IRQ0 handler with the PIC
/// already acknowledged. Rotates to the next runnable process once the
/// quantum expires.
pub fn tick() {
    let expired = {
        let mut state = STATE.lock();
        if state.quantum_remaining <= 1 {
            false
        } else {
            state.quantum_remaining -= 1;
            true
        }
    };
    if !expired {
        switch_next();
    }
}

/// `sched_yield` (spec §5): cooperative, explicit switch regardless of the
/// remaining quantum.
pub fn yield_now() {
    switch_next();
}

/// Mark the current process dead and hand off to whatever else is
/// runnable; never returns into the caller (spec §4.6 "Process" invariant
/// `dead` transitions are one-way).
pub fn exit_current() -> ! {
    let next = {
        let mut state = STATE.lock();
        state.current = None;
        state.quantum_remaining = config::SCHED_QUANTUM_TICKS as u32;
        state.run_queue.pop_front()
    };
    let next = match next {
        Some(pid) => pid,
        None => crate::arch::x86::cpu::halt_loop(),
    };
    STATE.lock().current = Some(next);

    let target = manager::prepare_switch(next);
    if let Some((eip, esp)) = target.pending_entry {
        manager::set_next_entry(eip, esp);
    }
    gdt::set_kernel_stack(target.kernel_stack_top);

    unsafe {
        X86Registers::write_cr3(target.cr3);
        #[allow(static_mut_refs)]
        context_switch::switch_to(core::ptr::addr_of_mut!(DISCARD_ESP), target.ksp);
    }
    unreachable!("a reaped process's stack is never switched back into")
}

fn switch_next() {
    let (prev, next) = {
        let mut state = STATE.lock();
        state.quantum_remaining = config::SCHED_QUANTUM_TICKS as u32;
        let next = match state.run_queue.pop_front() {
            Some(pid) => pid,
            None => return,
        };
        let prev = state.current;
        if prev != Some(next) {
            if let Some(cur) = prev {
                state.run_queue.push_back(cur);
            }
            state.current = Some(next);
        }
        (prev, next)
    };

    if prev == Some(next) {
        return;
    }

    let target = manager::prepare_switch(next);
    if let Some((eip, esp)) = target.pending_entry {
        manager::set_next_entry(eip, esp);
    }
    gdt::set_kernel_stack(target.kernel_stack_top);

    let prev_ptr: *mut u32 = match prev {
        Some(pid) => manager::ksp_ptr(pid),
        #[allow(static_mut_refs)]
        None => core::ptr::addr_of_mut!(BOOT_CTX_ESP),
    };

    unsafe {
        X86Registers::write_cr3(target.cr3);
        context_switch::switch_to(prev_ptr, target.ksp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantum_starts_at_configured_value() {
        assert!(config::SCHED_QUANTUM_TICKS > 0);
    }
}

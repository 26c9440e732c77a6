//! Interrupt subsystem (spec §4.5): a 256-entry ISR table indirected
//! through by the per-vector trampolines `build.rs` generates, a
//! spurious-IRQ filter for 39/47, and the registration entry points the
//! rest of the kernel installs handlers through.
//!
//! `arch::x86::idt` already owns gate construction; this module only owns
//! the table of Rust handlers each gate's trampoline indirects through,
//! and the bring-up sequencing for traps and IRQs.

pub mod timer;

use crate::arch::traits::{InterruptController, Ring};
use crate::arch::x86::constants::{GP_FAULT_VECTOR, PAGE_FAULT_VECTOR, SYSCALL_VECTOR};
use crate::arch::x86::X86Pic;
use crate::spinlock::SpinLockIrq;

/// The CPU-pushed frame + GP registers + vector/error code, in the exact
/// order `interrupt_tail.asm` pushes them (spec §4.5 step 2-3). `&TrapFrame`
/// is what `rust_interrupt_dispatch` receives.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

impl TrapFrame {
    pub fn ring(&self) -> Ring {
        if self.cs & 0x3 == 0x3 {
            Ring::User
        } else {
            Ring::Kernel
        }
    }
}

pub type IsrFn = fn(&mut TrapFrame);

const VECTOR_COUNT: usize = 256;

struct IsrTable {
    slots: [Option<IsrFn>; VECTOR_COUNT],
}

static ISR_TABLE: SpinLockIrq<IsrTable> = SpinLockIrq::new(IsrTable {
    slots: [None; VECTOR_COUNT],
});

/// `register_trap_isr` (spec §4.5): install a handler for a CPU exception
/// vector (0-31). `ring` selects the gate's DPL — `Ring` only has the two
/// values the IDT supports, so there's no invalid-ring case to reject.
pub fn register_trap_isr(vector: u8, ring: Ring, isr: IsrFn) {
    crate::arch::x86::idt::set_gate_dpl(vector, ring);
    ISR_TABLE.lock().slots[vector as usize] = Some(isr);
}

/// `register_irq_isr` (spec §4.5): install a DPL-0 gate for an IRQ vector
/// (32-47).
pub fn register_irq_isr(vector: u8, isr: IsrFn) {
    ISR_TABLE.lock().slots[vector as usize] = Some(isr);
}

fn stub_trap_handler(frame: &mut TrapFrame) {
    panic!(
        "unhandled trap: vector={} error_code={:#x} eip={:#x}",
        frame.vector, frame.error_code, frame.eip
    );
}

fn stub_irq_handler(frame: &mut TrapFrame) {
    X86Pic::send_eoi(frame.vector as u8);
}

fn page_fault_handler(frame: &mut TrapFrame) {
    use crate::arch::traits::ControlRegisterOps;
    use crate::arch::x86::X86Registers;
    use crate::memory::page_fault::{self, FaultReason};

    let fault_va = X86Registers::read_cr2();
    let reason = if frame.error_code & 0x1 != 0 {
        FaultReason::Protection
    } else {
        FaultReason::Absent
    };
    let kernel_ps = crate::memory::kernel_paging().lock();
    let new_ip = page_fault::handle(fault_va, frame.eip, frame.ring(), reason, &kernel_ps);
    frame.eip = new_ip;
}

/// Vector `0x80` (spec §4.13): syscall number in `eax`, up to six
/// arguments in the next six general-purpose registers, return value
/// written back into `eax`.
fn syscall_handler(frame: &mut TrapFrame) {
    let retval = crate::syscall::dispatch(
        frame.eax, frame.ebx, frame.ecx, frame.edx, frame.esi, frame.edi, frame.ebp,
    );
    frame.eax = retval as u32;
}

/// Vectors 39 (IRQ7) and 47 (IRQ15) need the PIC's in-service register
/// checked before EOI, per spec §4.5's spurious-IRQ filter.
const SPURIOUS_IRQ7: u32 = 39;
const SPURIOUS_IRQ15: u32 = 47;

fn is_spurious(vector: u32) -> bool {
    if vector != SPURIOUS_IRQ7 && vector != SPURIOUS_IRQ15 {
        return false;
    }
    // IRQ15 is the slave's IRQ7 (15 − 8 = 7): both spurious vectors show up
    // as bit 7 of their respective PIC's in-service register.
    let (master_isr, slave_isr) = X86Pic::read_isr();
    if vector == SPURIOUS_IRQ15 {
        slave_isr & (1 << 7) == 0
    } else {
        master_isr & (1 << 7) == 0
    }
}

/// `rust_interrupt_dispatch` (referenced by `interrupt_tail.asm`): look up
/// the vector's ISR slot and invoke it, applying the spurious-IRQ filter
/// first.
#[no_mangle]
pub extern "C" fn rust_interrupt_dispatch(frame: &mut TrapFrame) {
    if is_spurious(frame.vector) {
        return;
    }

    let isr = { ISR_TABLE.lock().slots[frame.vector as usize] };
    match isr {
        Some(isr) => isr(frame),
        None => panic!("interrupt on unregistered vector {}", frame.vector),
    }
}

/// Bring up the ISR table to its spec §4.5 initial state: 0-31 at the trap
/// stub, 32-47 at the IRQ stub (already EOI-acknowledging), 48-255 left
/// unregistered ("not present" — any fault there panics via
/// `rust_interrupt_dispatch`'s `None` arm).
pub fn init() {
    {
        let mut table = ISR_TABLE.lock();
        for v in 0..32u16 {
            table.slots[v as usize] = Some(stub_trap_handler);
        }
        for v in 32..48u16 {
            table.slots[v as usize] = Some(stub_irq_handler);
        }
    }

    register_trap_isr(PAGE_FAULT_VECTOR, Ring::Kernel, page_fault_handler);
    register_trap_isr(GP_FAULT_VECTOR, Ring::Kernel, stub_trap_handler);
    register_trap_isr(SYSCALL_VECTOR, Ring::User, syscall_handler);
    register_irq_isr(timer::IRQ_VECTOR, timer::handler);

    timer::init_hardware();
    X86Pic::enable_irq(0);

    // IRQs stay masked at the CPU (`IF=0`) until the first ring transition
    // (spec §5: "IRQs are enabled only while a user process is running");
    // `process::manager::enter_userspace_trampoline` is what lifts `IF`.
    log::info!("interrupts: ISR table initialized");
}

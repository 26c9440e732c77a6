//! Architecture-agnostic traits for hardware abstraction, trimmed to the
//! one backend this spec targets and extended with the primitives spec
//! §4.0/§9 name explicitly: port I/O, MSR access, CR register access, and
//! per-vector trampolines.

/// Ring 0 / ring 3 privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    Kernel,
    User,
}

impl Ring {
    pub const fn is_kernel(self) -> bool {
        matches!(self, Ring::Kernel)
    }

    pub const fn is_user(self) -> bool {
        matches!(self, Ring::User)
    }
}

/// The CPU state saved on entry to a trap/interrupt handler (§4.5 step 2-3:
/// CPU-pushed frame + general-purpose registers + fake/real error code).
pub trait InterruptFrame {
    fn instruction_pointer(&self) -> u32;
    fn set_instruction_pointer(&mut self, addr: u32);
    fn stack_pointer(&self) -> u32;
    fn error_code(&self) -> u32;
    fn privilege_level(&self) -> Ring;
    fn is_from_userspace(&self) -> bool {
        self.privilege_level().is_user()
    }
}

/// Page table entry flag operations (§3 "Page"). Kept architecture-neutral
/// so `memory::paging` never manipulates raw bit patterns itself.
pub trait PageFlags: Copy + Clone + Sized {
    fn empty() -> Self;
    fn present() -> Self;
    fn writable() -> Self;
    fn user_accessible() -> Self;
    fn no_execute() -> Self;
    fn or(self, other: Self) -> Self;
    fn contains(&self, other: Self) -> bool;
    fn without(self, other: Self) -> Self;
}

/// Port I/O primitives (§4.0).
pub trait PortIo {
    unsafe fn in_u8(port: u16) -> u8;
    unsafe fn out_u8(port: u16, value: u8);
    unsafe fn in_u16(port: u16) -> u16;
    unsafe fn out_u16(port: u16, value: u16);
    unsafe fn in_u32(port: u16) -> u32;
    unsafe fn out_u32(port: u16, value: u32);
}

/// Model-specific register access (§4.0).
pub trait MsrOps {
    unsafe fn rdmsr(msr: u32) -> u64;
    unsafe fn wrmsr(msr: u32, value: u64);
}

/// Control register access (§4.0): CR0 (protection/paging enable), CR2
/// (faulting address), CR3 (paging structure root), CR4 (PAE enable).
pub trait ControlRegisterOps {
    fn read_cr0() -> u32;
    unsafe fn write_cr0(value: u32);
    fn read_cr2() -> u32;
    fn read_cr3() -> u32;
    unsafe fn write_cr3(value: u32);
    fn read_cr4() -> u32;
    unsafe fn write_cr4(value: u32);
}

/// TLB maintenance (§4.2, §5: "every map_page/set_page_flags/rm_page_flags
/// flushes exactly one TLB entry").
pub trait TlbOps {
    fn flush_page(addr: u32);
    fn flush_all();
}

pub trait InterruptController {
    fn init();
    fn enable_irq(irq: u8);
    fn disable_irq(irq: u8);
    fn send_eoi(vector: u8);
    /// Reads the in-service register via OCW3 for the spurious-IRQ filter
    /// (§4.5). Returns `(master_isr, slave_isr)`.
    fn read_isr() -> (u8, u8);
}

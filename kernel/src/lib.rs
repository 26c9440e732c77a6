#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![feature(alloc_error_handler)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

//! Talon: a monolithic x86 (32-bit, PAE) kernel core — virtual memory,
//! interrupts, processes, VFS, block devices, and the PCI/PS2/PATA device
//! substrate.

extern crate alloc;

#[macro_use]
pub mod macros;

pub mod arch;
pub mod block;
pub mod config;
pub mod drivers;
pub mod elf;
pub mod errno;
pub mod fs;
pub mod interrupts;
pub mod logger;
pub mod memory;
pub mod multiboot;
pub mod panic;
pub mod process;
pub mod sched;
pub mod sinks;
pub mod spinlock;
pub mod syscall;
pub mod useraccess;

/// Bring up the kernel's ambient stack and every subsystem, in the
/// dependency order spec §2 lays out: arch layer, frame allocator,
/// paging, page-fault arbiter, heap, interrupts, process manager,
/// scheduler, VFS, block layer, bus drivers, storage drivers, sinks.
///
/// # Safety
/// Must run exactly once, very early, before any interrupt can fire.
pub unsafe fn init(multiboot_magic: u32, multiboot_info: u32) {
    sinks::register_sink(alloc::boxed::Box::new(sinks::vga::VgaTextSink::new()));
    sinks::register_sink(alloc::boxed::Box::new(sinks::serial::com1()));
    logger::init_early();
    logger::sinks_ready();

    log::info!("talon: boot");

    let memory_map =
        multiboot::parse(multiboot_magic, multiboot_info).expect("invalid multiboot info");

    memory::init(&memory_map);
    arch::x86::init(memory::layout::initial_kernel_stack_top());
    interrupts::init();
    sched::init();
    process::init();
    fs::vfs::init();
    block::init();
    drivers::pci::enumerate_devices();
    drivers::ps2::init();
    fs::vfs::mount("devfs", "/dev", "devfs", 0).expect("devfs mount must succeed");

    log::info!("talon: subsystems initialized");
}

/// Quit QEMU via the `isa-debug-exit` device: a no_std test-runner idiom
/// for reporting a pass/fail result without depending on a hosted test
/// harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    use crate::arch::traits::PortIo;
    use crate::arch::x86::X86Io;
    unsafe { X86Io::out_u32(0xf4, exit_code as u32) };
    arch::x86::cpu::halt_loop()
}

#[cfg(test)]
use core::panic::PanicInfo;

#[cfg(test)]
pub fn test_runner(tests: &[&dyn Fn()]) {
    sinks::register_sink(alloc::boxed::Box::new(sinks::serial::com1()));
    kprintln!("running {} tests", tests.len());
    for test in tests {
        test();
    }
    exit_qemu(QemuExitCode::Success);
}

#[cfg(test)]
fn test_kernel_main() -> ! {
    test_main();
    arch::x86::cpu::halt_loop()
}

#[cfg(test)]
#[panic_handler]
fn test_panic_handler(info: &PanicInfo) -> ! {
    kprintln!("[failed]\n{}", info);
    exit_qemu(QemuExitCode::Failed)
}

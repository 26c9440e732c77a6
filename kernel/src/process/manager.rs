//! Process table and spawn flow (spec §4.6 "Process Manager").
//!
//! One global table, a monotonic pid counter, spawn/exit/wait as its
//! public surface. Storage is a fixed-capacity `Vec<Option<Process>>`
//! preallocated to `MAX_PROCESSES` and never reallocated afterward,
//! because `sched::switch_to` needs a raw pointer into a `Process`'s
//! `ksp` field that stays valid across a switch that may not return for
//! an arbitrarily long time — exactly the pointer-stability constraint
//! spec §4.7 states for the vnode cache, applied here to the process
//! table instead.

use crate::arch::x86::constants::PAGE_SIZE;
use crate::arch::x86::context_switch;
use crate::config;
use crate::elf;
use crate::errno::{KError, KResult};
use crate::memory::heap;
use crate::memory::layout::{PROC_HIGH_ADDRESS, PROC_KSTACK_SIZE, PROC_STACK_PAGESPAN};
use crate::memory::paging::{PageFlags, PagingStruct};
use crate::process::process::{FdTable, Process, ProcessId, ProcessState};
use crate::sched;
use crate::spinlock::SpinLockIrq;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

struct Table {
    slots: Vec<Option<Process>>,
}

static TABLE: SpinLockIrq<Option<Table>> = SpinLockIrq::new(None);
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

/// Stashed by `sched::switch_next`/`exit_current` just before a switch
/// into a process that has never run, for `enter_userspace_trampoline` to
/// consume the instant it starts executing on that process's kernel
/// stack.
static NEXT_ENTRY: SpinLockIrq<Option<(u32, u32)>> = SpinLockIrq::new(None);

pub fn init() {
    let mut slots = Vec::with_capacity(config::MAX_PROCESSES as usize);
    for _ in 0..config::MAX_PROCESSES {
        slots.push(None);
    }
    *TABLE.lock() = Some(Table { slots });
    log::info!(
        "process: table initialized, capacity={}",
        config::MAX_PROCESSES
    );
}

fn slot_index(pid: ProcessId) -> usize {
    (pid.as_u32() as usize - 1) % config::MAX_PROCESSES as usize
}

/// `spawn` (spec §4.6 "Spawn flow"): load `path`'s ELF image into a fresh
/// address space and make the result runnable.
///
/// 1. `init_paging_struct` + `map_kernel_into` so the new structure can
///    run kernel code once it's activated.
/// 2. Read the whole file off the VFS.
/// 3. Validate + parse the ELF image (`elf::load`); `ET_EXEC`/class
///    mismatches surface as `KError::NoExec`.
/// 4. Map each `PT_LOAD` segment: `new_user_page` forces `WRITABLE` on so
///    the file contents can be copied in, then `rm_page_flags` drops it
///    again unless the segment itself is writable.
/// 5. Map the user stack, ending at `PROC_HIGH_ADDRESS`.
/// 6. Allocate the kernel stack from the heap and seed it with
///    `build_initial_stack` pointed at `enter_userspace_trampoline`.
/// 7. Assign a pid, insert into the table, enqueue with the scheduler.
pub fn spawn(path: &str, parent: Option<ProcessId>) -> KResult<ProcessId> {
    let mut paging = PagingStruct::new();
    paging.map_kernel_into();

    let data = crate::fs::vfs::read_whole_file(path).map_err(|_| KError::NotFound)?;
    let image = elf::load(&data)?;

    for seg in &image.segments {
        let start_page = seg.vaddr & !(PAGE_SIZE - 1);
        let end = seg.vaddr + seg.memsz;
        let end_page = (end + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let mut va = start_page;
        while va < end_page {
            paging.new_user_page(va, PageFlags::PRESENT.or(PageFlags::WRITABLE));
            va += PAGE_SIZE;
        }

        if seg.filesz > 0 {
            let file_bytes = &data[seg.offset as usize..(seg.offset + seg.filesz) as usize];
            unsafe {
                let dst = seg.vaddr as *mut u8;
                core::ptr::copy_nonoverlapping(file_bytes.as_ptr(), dst, file_bytes.len());
                if seg.memsz > seg.filesz {
                    core::ptr::write_bytes(
                        dst.add(seg.filesz as usize),
                        0,
                        (seg.memsz - seg.filesz) as usize,
                    );
                }
            }
        }

        if !seg.writable {
            let mut va = start_page;
            while va < end_page {
                paging.rm_page_flags(va, PageFlags::WRITABLE);
                va += PAGE_SIZE;
            }
        }
        if !seg.executable {
            let mut va = start_page;
            while va < end_page {
                paging.set_page_flags(va, PageFlags::NO_EXECUTE);
                va += PAGE_SIZE;
            }
        }
    }

    let user_stack_top = PROC_HIGH_ADDRESS;
    let stack_bottom = user_stack_top - PROC_STACK_PAGESPAN * PAGE_SIZE;
    let mut va = stack_bottom;
    while va < user_stack_top {
        paging.new_user_page(va, PageFlags::PRESENT.or(PageFlags::WRITABLE));
        va += PAGE_SIZE;
    }

    let kernel_stack_base = unsafe { heap::kmalloc_aligned(PROC_KSTACK_SIZE, 16) };
    if kernel_stack_base.is_null() {
        return Err(KError::NoMemory);
    }
    let kernel_stack_base = kernel_stack_base as u32;
    let kernel_stack_top = kernel_stack_base + PROC_KSTACK_SIZE as u32;

    let ksp = unsafe {
        context_switch::build_initial_stack(
            kernel_stack_top,
            enter_userspace_trampoline as usize as u32,
        )
    };

    let pid = ProcessId(NEXT_PID.fetch_add(1, Ordering::SeqCst));

    let process = Process {
        pid,
        parent,
        path: path.to_string(),
        paging,
        inst_ptr: image.entry,
        user_stack_top,
        user_stack_ptr: user_stack_top,
        user_stack_pagespan: PROC_STACK_PAGESPAN,
        kernel_stack_top,
        kernel_stack_base,
        kernel_stack_size: PROC_KSTACK_SIZE,
        ksp,
        entered: false,
        fds: FdTable::new(),
        state: ProcessState::Ready,
        exit_status: 0,
        dead: false,
    };

    {
        let mut guard = TABLE.lock();
        let table = guard.as_mut().expect("process table not initialized");
        let idx = slot_index(pid);
        if table.slots[idx].is_some() {
            return Err(KError::NoMemory);
        }
        table.slots[idx] = Some(process);
    }

    sched::enqueue(pid);
    log::info!("process: spawned pid={} path={}", pid.as_u32(), path);
    Ok(pid)
}

/// What `sched::switch_next`/`exit_current` need to actually perform a
/// switch, read out of the table while it's still locked so the switch
/// itself doesn't need to hold the lock across `switch_to`.
pub(crate) struct SwitchTarget {
    pub cr3: u32,
    pub ksp: u32,
    pub kernel_stack_top: u32,
    pub pending_entry: Option<(u32, u32)>,
}

pub(crate) fn prepare_switch(pid: ProcessId) -> SwitchTarget {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("process table not initialized");
    let idx = slot_index(pid);
    let process = table.slots[idx].as_mut().expect("switch target vanished");

    let pending_entry = if process.entered {
        None
    } else {
        process.entered = true;
        Some((process.inst_ptr, process.user_stack_top))
    };
    process.state = ProcessState::Running;

    SwitchTarget {
        cr3: process.paging.phys_addr(),
        ksp: process.ksp,
        kernel_stack_top: process.kernel_stack_top,
        pending_entry,
    }
}

pub(crate) fn set_next_entry(eip: u32, esp: u32) {
    *NEXT_ENTRY.lock() = Some((eip, esp));
}

/// Raw pointer to `pid`'s saved `ksp` field, for `switch_to`'s
/// `prev_esp_slot` parameter. Sound only because the table never
/// reallocates after `init`.
pub(crate) fn ksp_ptr(pid: ProcessId) -> *mut u32 {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("process table not initialized");
    let idx = slot_index(pid);
    let process = table.slots[idx].as_mut().expect("ksp_ptr target vanished");
    process.state = ProcessState::Ready;
    core::ptr::addr_of_mut!(process.ksp)
}

/// First code to run on a freshly spawned process's kernel stack (spec
/// §4.6 "Ring transition"). Consumes the pair `spawn`/`prepare_switch`
/// stashed and drops straight to ring 3; never returns.
pub(crate) extern "C" fn enter_userspace_trampoline() -> ! {
    let (eip, esp) = NEXT_ENTRY
        .lock()
        .take()
        .expect("trampoline entered with no pending entry");
    unsafe {
        context_switch::iret_to_ring3(eip, esp);
    }
}

/// `exit` (spec §4.6): mark the current process a zombie, record its exit
/// status, and hand off to the scheduler — never returns.
pub fn exit_current(exit_status: i32) -> ! {
    if let Some(pid) = sched::current_pid() {
        let mut guard = TABLE.lock();
        let table = guard.as_mut().expect("process table not initialized");
        let idx = slot_index(pid);
        if let Some(process) = table.slots[idx].as_mut() {
            process.state = ProcessState::Zombie;
            process.exit_status = exit_status;
            process.dead = true;
        }
    }
    sched::exit_current()
}

pub fn current_path(pid: ProcessId) -> Option<String> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut()?;
    let idx = slot_index(pid);
    table.slots[idx].as_ref().map(|p| p.path.clone())
}

/// Slot lookup that also checks the stored pid still matches — guards
/// against a wrapped `slot_index` silently addressing whatever process is
/// now occupying a reaped slot.
fn with_process<R>(pid: ProcessId, f: impl FnOnce(&Process) -> R) -> Option<R> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut()?;
    let idx = slot_index(pid);
    let process = table.slots[idx].as_ref()?;
    if process.pid != pid {
        return None;
    }
    Some(f(process))
}

fn with_process_mut<R>(pid: ProcessId, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut()?;
    let idx = slot_index(pid);
    let process = table.slots[idx].as_mut()?;
    if process.pid != pid {
        return None;
    }
    Some(f(process))
}

/// `open`'s fd-table half (spec §4.12 "File descriptors"): hands `pid` a
/// fresh local fd backed by `system_index` into the open-file table.
pub fn alloc_fd(pid: ProcessId, system_index: usize) -> Option<usize> {
    with_process_mut(pid, |p| p.fds.alloc(system_index))
}

/// Resolve a process-local fd to its open-file-table index, for
/// `read`/`write`/`lseek`/`ioctl`/`close`.
pub fn fd_system_index(pid: ProcessId, local_fd: usize) -> Option<usize> {
    with_process(pid, |p| p.fds.get(local_fd))?
}

/// `close`'s fd-table half: frees the local slot and returns the
/// open-file-table index it pointed at, so the caller can drop its own
/// reference count.
pub fn free_fd(pid: ProcessId, local_fd: usize) -> Option<usize> {
    with_process_mut(pid, |p| p.fds.free(local_fd))?
}

/// True if `parent` has at least one live (non-reaped) child in the table,
/// zombie or not — `waitpid` needs this to tell "no such child" (`ECHILD`)
/// apart from "child exists but hasn't exited yet" (would-block).
pub fn has_child(parent: ProcessId, target: Option<ProcessId>) -> bool {
    let mut guard = TABLE.lock();
    let Some(table) = guard.as_mut() else {
        return false;
    };
    table.slots.iter().flatten().any(|p| {
        p.parent == Some(parent) && target.map_or(true, |t| p.pid == t)
    })
}

/// Find a zombie child of `parent` (optionally restricted to one `target`
/// pid), reap its slot, and return `(pid, exit_status)`. Reaping here means
/// removing the table entry entirely — once a parent has collected a
/// child's exit status, nothing else in this kernel needs that slot, and
/// freeing it lets `spawn` reuse the index instead of treating a wrapped
/// `NEXT_PID` as permanently out of slots.
pub fn reap_zombie_child(
    parent: ProcessId,
    target: Option<ProcessId>,
) -> Option<(ProcessId, i32)> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut()?;
    let idx = table.slots.iter().position(|slot| {
        slot.as_ref().is_some_and(|p| {
            p.parent == Some(parent)
                && p.state == ProcessState::Zombie
                && target.map_or(true, |t| p.pid == t)
        })
    })?;
    let process = table.slots[idx].take()?;
    Some((process.pid, process.exit_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_wraps_within_capacity() {
        let first = ProcessId(1);
        let wrapped = ProcessId(config::MAX_PROCESSES as u32 + 1);
        assert_eq!(slot_index(first), slot_index(wrapped));
    }

    // `with_process`/`with_process_mut`/`has_child`/`reap_zombie_child`/
    // `spawn` all need a live `Process`, which owns a `PagingStruct` backed
    // by the real frame allocator and port I/O — nothing in this crate's
    // test suite stands up that hardware state (see `page_fault.rs`,
    // `sched.rs`: same boundary, same reason). `FdTable`'s own alloc/free/
    // get logic is covered directly in `process.rs`, which is the part of
    // `alloc_fd`/`fd_system_index`/`free_fd` that isn't a thin pid-checked
    // passthrough to it.
}

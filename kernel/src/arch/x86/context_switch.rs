//! The two-sided cooperative context-switch primitive (spec §4.6).
//!
//! Only the callee-saved registers (`ebx`, `esi`, `edi`, `ebp`) and the
//! stack pointer need to cross a switch: everything else is caller-saved
//! by the System V calling convention this kernel is built under, so the
//! C-call boundary into `switch_to` already did that work, using the
//! 32-bit `esp`/`ebx`/`esi`/`edi`/`ebp` register set.

use core::arch::asm;

/// Switch from the current kernel stack to `next_esp`, stashing the
/// current kernel stack pointer at `*prev_esp_slot` first.
///
/// Both stacks must already contain a frame pushed by a previous call to
/// this function (or the synthetic initial frame `spawn` builds for a new
/// process, §4.6 "new process context" — see `process::manager::spawn`),
/// so that the `ret` at the end lands in the right place for each side.
///
/// # Safety
/// `prev_esp_slot` must be a valid pointer to storage for the outgoing
/// process's saved stack pointer. `next_esp` must point at a stack built
/// by this same convention. Must run with interrupts disabled; the caller
/// is responsible for re-enabling them (or not) once control returns.
#[inline(never)]
pub unsafe fn switch_to(prev_esp_slot: *mut u32, next_esp: u32) {
    asm!(
        "pushfd",
        "push ebx",
        "push esi",
        "push edi",
        "push ebp",
        "mov [{prev}], esp",
        "mov esp, {next}",
        "pop ebp",
        "pop edi",
        "pop esi",
        "pop ebx",
        "popfd",
        prev = in(reg) prev_esp_slot,
        next = in(reg) next_esp,
        options(nostack),
    );
}

/// Lay out the initial stack frame for a process that has never run, so
/// the first `switch_to` into it lands at `entry` with `switch_to`'s own
/// prologue already "popped". Spec §4.6: new processes join the scheduler
/// through the same two-sided primitive used for every later switch,
/// rather than a special first-run path.
///
/// Returns the stack pointer to store as that process's saved `esp`.
///
/// # Safety
/// `stack_top` must be the top (highest address, 4-byte aligned) of a
/// valid, writable kernel stack at least 32 bytes below `stack_top`.
pub unsafe fn build_initial_stack(stack_top: u32, entry: u32) -> u32 {
    let mut sp = stack_top as *mut u32;

    sp = sp.sub(1);
    sp.write(entry); // return address `switch_to`'s epilogue `ret` pops

    // Pushed/popped in `pushfd; push ebx; push esi; push edi; push ebp` /
    // `pop ebp; pop edi; pop esi; pop ebx; popfd` order, so `ebp` must end
    // up at the lowest address (the final `esp`) and `eflags` just below
    // the return address.
    sp = sp.sub(1);
    sp.write(0x0000_0200); // eflags: IF clear, reserved bit 1 set
    sp = sp.sub(1);
    sp.write(0); // ebx
    sp = sp.sub(1);
    sp.write(0); // esi
    sp = sp.sub(1);
    sp.write(0); // edi
    sp = sp.sub(1);
    sp.write(0); // ebp

    sp as u32
}

/// Ring transition (spec §4.6): drop from ring 0 to ring 3 at `(eip,
/// user_esp)`, on the user code/data selectors. Used the first time a
/// freshly spawned process's kernel stack (built by `build_initial_stack`)
/// is switched into — everywhere else, resuming a process means `ret`-ing
/// back into wherever it last called `switch_to` from.
///
/// # Safety
/// Must run with interrupts disabled; `eip`/`user_esp` must address pages
/// already mapped `USER` in the currently loaded paging structure.
#[inline(never)]
pub unsafe fn iret_to_ring3(eip: u32, user_esp: u32) -> ! {
    use crate::arch::x86::gdt::selector;
    asm!(
        "push {ss}",
        "push {esp}",
        "push {eflags}",
        "push {cs}",
        "push {eip}",
        "iretd",
        ss = const selector::USER_DATA as u32,
        esp = in(reg) user_esp,
        eflags = const 0x0000_0202u32,
        cs = const selector::USER_CODE as u32,
        eip = in(reg) eip,
        options(noreturn),
    );
}

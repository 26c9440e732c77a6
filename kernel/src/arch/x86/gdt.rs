//! 32-bit GDT + TSS construction (spec §4.0 "IDT/GDT/TSS encoding").
//!
//! There is no high-level builder for 32-bit flat descriptors in the
//! crates this target can use (`x86_64::structures::gdt` only knows the
//! 64-bit descriptor layout), so the 8-byte descriptor format is encoded
//! by hand here — this *is* the arch-layer responsibility spec §9 calls
//! out explicitly.

use core::arch::asm;
use core::mem::size_of;
use conquer_once::spin::OnceCell;

/// One 8-byte GDT entry, raw IA-32 segment-descriptor format.
#[derive(Clone, Copy)]
#[repr(C)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        GdtEntry {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        GdtEntry {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (((limit >> 16) & 0x0F) as u8) | (flags << 4),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// Segment selectors, index << 3 | RPL.
pub mod selector {
    pub const KERNEL_CODE: u16 = 1 << 3;
    pub const KERNEL_DATA: u16 = 2 << 3;
    pub const USER_CODE: u16 = (3 << 3) | 3;
    pub const USER_DATA: u16 = (4 << 3) | 3;
    pub const TSS: u16 = 5 << 3;
}

// Access byte bits: present | DPL(2) | 1 | type(4)
const ACCESS_PRESENT: u8 = 0x80;
const ACCESS_CODE_DATA: u8 = 0x10;
const ACCESS_CODE_EXEC_READ: u8 = 0x0A;
const ACCESS_DATA_READ_WRITE: u8 = 0x02;
const ACCESS_TSS32_BUSY_FREE: u8 = 0x09;
const DPL0: u8 = 0 << 5;
const DPL3: u8 = 3 << 5;
// Granularity byte high nibble: [gran(4KiB)=1][size(32bit)=1][long=0][avl=0]
const FLAGS_32BIT_PAGE_GRAN: u8 = 0b1100;
const FLAGS_TSS: u8 = 0b0000;

/// 32-bit Task State Segment, used only for ring0 stack switching and the
/// I/O permission bitmap offset — not for hardware task-switching.
#[repr(C, packed)]
pub struct Tss {
    pub link: u16,
    _r0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _r1: u16,
    pub esp1: u32,
    pub ss1: u16,
    _r2: u16,
    pub esp2: u32,
    pub ss2: u16,
    _r3: u16,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u16,
    _r4: u16,
    pub cs: u16,
    _r5: u16,
    pub ss: u16,
    _r6: u16,
    pub ds: u16,
    _r7: u16,
    pub fs: u16,
    _r8: u16,
    pub gs: u16,
    _r9: u16,
    pub ldt: u16,
    _r10: u16,
    pub trap: u16,
    pub iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        // SAFETY: all-zero is a valid (if inert) TSS; iomap_base is set in
        // `init` to disable the I/O bitmap entirely.
        unsafe { core::mem::zeroed() }
    }
}

const GDT_ENTRIES: usize = 6;

#[repr(C, align(8))]
struct Gdt([GdtEntry; GDT_ENTRIES]);

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

static TSS: SyncUnsafeCellTss = SyncUnsafeCellTss(core::cell::UnsafeCell::new(Tss::new()));
static GDT: OnceCell<Gdt> = OnceCell::uninit();

struct SyncUnsafeCellTss(core::cell::UnsafeCell<Tss>);
unsafe impl Sync for SyncUnsafeCellTss {}

/// Initialize and load the GDT, TSS, and segment registers.
///
/// # Safety
/// Must run once, early, before any interrupt or ring transition.
pub unsafe fn init(kernel_stack_top: u32) {
    let tss_ptr = TSS.0.get();
    (*tss_ptr).esp0 = kernel_stack_top;
    (*tss_ptr).ss0 = selector::KERNEL_DATA;
    // iomap_base beyond the segment limit disables per-port I/O checks.
    (*tss_ptr).iomap_base = size_of::<Tss>() as u16;

    let tss_base = tss_ptr as u32;
    let tss_limit = (size_of::<Tss>() - 1) as u32;

    let gdt = GDT.init_once(|| {
        Gdt([
            GdtEntry::null(),
            GdtEntry::new(
                0,
                0xFFFFF,
                ACCESS_PRESENT | DPL0 | ACCESS_CODE_DATA | ACCESS_CODE_EXEC_READ,
                FLAGS_32BIT_PAGE_GRAN,
            ),
            GdtEntry::new(
                0,
                0xFFFFF,
                ACCESS_PRESENT | DPL0 | ACCESS_CODE_DATA | ACCESS_DATA_READ_WRITE,
                FLAGS_32BIT_PAGE_GRAN,
            ),
            GdtEntry::new(
                0,
                0xFFFFF,
                ACCESS_PRESENT | DPL3 | ACCESS_CODE_DATA | ACCESS_CODE_EXEC_READ,
                FLAGS_32BIT_PAGE_GRAN,
            ),
            GdtEntry::new(
                0,
                0xFFFFF,
                ACCESS_PRESENT | DPL3 | ACCESS_CODE_DATA | ACCESS_DATA_READ_WRITE,
                FLAGS_32BIT_PAGE_GRAN,
            ),
            GdtEntry::new(
                tss_base,
                tss_limit,
                ACCESS_PRESENT | DPL0 | ACCESS_TSS32_BUSY_FREE,
                FLAGS_TSS,
            ),
        ])
    });

    let pointer = DescriptorTablePointer {
        limit: (size_of::<Gdt>() - 1) as u16,
        base: gdt as *const _ as u32,
    };

    asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
    reload_segments();
    asm!("ltr {:x}", in(reg) selector::TSS, options(nostack, preserves_flags));
}

unsafe fn reload_segments() {
    asm!(
        "push {cs}",
        "lea {tmp}, [1f]",
        "push {tmp}",
        "retf",
        "1:",
        "mov ax, {ds}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        cs = const selector::KERNEL_CODE,
        ds = const selector::KERNEL_DATA,
        tmp = lateout(reg) _,
        out("ax") _,
        options(preserves_flags),
    );
}

/// Update `TSS.esp0`, called by the scheduler on every outgoing context
/// switch so "TSS.esp0 points at the current process's kernel stack top"
/// (spec §3 invariant) always holds.
pub fn set_kernel_stack(top: u32) {
    unsafe {
        (*TSS.0.get()).esp0 = top;
    }
}

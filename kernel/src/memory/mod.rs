//! Memory subsystem entry point (spec §4.1-§4.4): frame allocator, PAE
//! paging, the page-fault arbiter, and the kernel heap, brought up in the
//! order each depends on the last.
//!
//! One function, one logged step per subsystem brought up.

pub mod frame_allocator;
pub mod heap;
pub mod layout;
pub mod page_fault;
pub mod paging;

use crate::multiboot::MemoryMap;
use conquer_once::spin::OnceCell;
use spin::Mutex;

static KERNEL_PAGING: OnceCell<Mutex<paging::PagingStruct>> = OnceCell::uninit();

/// Bring up the memory subsystem: frame allocator from the Multiboot
/// memory map, the kernel's own paging structure with itself aliased in
/// and activated, PAE + paging enabled, then the bootstrap heap.
///
/// The real kernel heap (spec §4.4 "the real heap is then registered and
/// made active") is brought up lazily instead, by `page_fault::handle`'s
/// demand-mapping path the first time a heap address faults — there is no
/// separate eager mapping step for it.
pub fn init(memory_map: &MemoryMap) {
    log::info!("memory: initializing frame allocator");
    frame_allocator::init(memory_map);

    log::info!("memory: initializing bootstrap heap");
    heap::init_bootstrap_heap();

    log::info!("memory: building kernel paging structure");
    let kernel_ps = paging::PagingStruct::new();
    kernel_ps.map_kernel_into();

    unsafe {
        kernel_ps.activate();
        paging::enable_paging();
    }

    log::info!("memory: enforcing kernel section permissions");
    kernel_ps.enforce_kernel_sections();

    KERNEL_PAGING.init_once(|| Mutex::new(kernel_ps));
    log::info!("memory: paging enabled");
}

/// The kernel's own paging structure, used by the page-fault arbiter and
/// by process creation to build `map_kernel_into` aliases for new address
/// spaces.
pub fn kernel_paging() -> &'static Mutex<paging::PagingStruct> {
    KERNEL_PAGING.get().expect("memory::init not called yet")
}

//! Kernel heap allocator, the "gallocator" (spec §4.4): a per-heap
//! tri-pool bitmap allocator over chunk sizes 32/64/128 bytes.
//!
//! One global allocator instance (`#[global_allocator]`), a
//! `Result`-returning `init`, over a page-mapped region — but a
//! hand-rolled allocator body rather than `linked_list_allocator`, since
//! the spec's tie-break rules (lowest-index run, metadata in the
//! preceding chunk, no cross-pool upgrade) aren't expressible through
//! that crate's API.
//!
//! This allocator never itself calls `alloc` — every structure it needs
//! lives at fixed offsets inside the heap's own byte range, computed once
//! at registration time.

use crate::spinlock::SpinLock;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

/// Bootstrap heap size (spec §4.4 "size ≥ 200 KiB").
pub const BOOTSTRAP_HEAP_SIZE: usize = crate::config::BOOTSTRAP_HEAP_SIZE as usize;

/// Default alignment: the alignment of the widest scalar (spec §4.4).
pub const DEFAULT_ALIGNMENT: u32 = core::mem::align_of::<u64>() as u32;

const ALLOCATION_SIGNATURE: u32 = 0x6741_4c4c; // "gALL"

const CHUNK_SIZE_LO: u32 = 32;
const CHUNK_SIZE_MID: u32 = 64;
const CHUNK_SIZE_HI: u32 = 128;

/// Metadata stored in the chunk preceding every live allocation.
#[repr(C)]
#[derive(Clone, Copy)]
struct AllocationMetadata {
    signature: u32,
    size: u32,
    chunksize: u32,
    alignment: u32,
}

#[derive(Clone, Copy)]
struct PoolDescriptor {
    pool_base: u32,
    chunk_count: u32,
    chunk_size: u32,
    bitmap_base: u32,
}

impl PoolDescriptor {
    fn compute(region_base: u32, region_bytes: u32, chunk_size: u32) -> PoolDescriptor {
        let max_count = region_bytes / chunk_size;
        let bitmap_bytes = (max_count + 7) / 8;
        let pool_bytes = region_bytes.saturating_sub(bitmap_bytes);
        let chunk_count = pool_bytes / chunk_size;
        let descriptor = PoolDescriptor {
            pool_base: region_base + bitmap_bytes,
            chunk_count,
            chunk_size,
            bitmap_base: region_base,
        };
        // Chunk 0 has no preceding chunk to use as its metadata slot, so
        // it's permanently reserved and never handed out.
        if chunk_count > 0 {
            descriptor.set_used(0);
        }
        descriptor
    }

    fn bit_ptr(&self, index: u32) -> (*mut u8, u8) {
        let byte = unsafe { (self.bitmap_base as *mut u8).add((index / 8) as usize) };
        (byte, 1 << (index % 8))
    }

    fn is_free(&self, index: u32) -> bool {
        let (byte, mask) = self.bit_ptr(index);
        unsafe { *byte & mask == 0 }
    }

    fn set_used(&self, index: u32) {
        let (byte, mask) = self.bit_ptr(index);
        unsafe { *byte |= mask };
    }

    fn set_free(&self, index: u32) {
        let (byte, mask) = self.bit_ptr(index);
        unsafe { *byte &= !mask };
    }

    fn chunk_addr(&self, index: u32) -> u32 {
        self.pool_base + index * self.chunk_size
    }

    fn run_is_free(&self, start: u32, count: u32) -> bool {
        (start..start + count).all(|i| self.is_free(i))
    }

    /// Walk the bitmap for a run of `count` free chunks, first-chunk
    /// aligned to `alignment`, whose preceding chunk is also free
    /// (spec §4.4 allocation steps 1-2).
    fn find_run(&self, count: u32, alignment: u32) -> Option<u32> {
        if self.chunk_count == 0 || count == 0 {
            return None;
        }
        let mut start = 1;
        while start + count <= self.chunk_count {
            if self.chunk_addr(start) % alignment == 0
                && self.is_free(start - 1)
                && self.run_is_free(start, count)
            {
                return Some(start);
            }
            start += 1;
        }
        None
    }

    fn owns(&self, addr: u32) -> bool {
        addr >= self.pool_base && addr < self.pool_base + self.chunk_count * self.chunk_size
    }

    fn used_count(&self) -> u32 {
        (0..self.chunk_count).filter(|&i| !self.is_free(i)).count() as u32
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            chunk_size: self.chunk_size,
            chunk_count: self.chunk_count,
            used_chunks: self.used_count(),
        }
    }
}

/// Per-pool chunk usage (spec §4.4b), one of three per heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub chunk_size: u32,
    pub chunk_count: u32,
    pub used_chunks: u32,
}

/// Per-heap header (spec §4.4): one `PoolDescriptor` per chunk size.
struct Heap {
    lo: PoolDescriptor,
    mid: PoolDescriptor,
    hi: PoolDescriptor,
}

impl Heap {
    fn new(base: u32, size: u32) -> Heap {
        let lo_bytes = size / 4;
        let mid_bytes = size / 4;
        let hi_bytes = size - lo_bytes - mid_bytes;

        let lo_base = base;
        let mid_base = lo_base + lo_bytes;
        let hi_base = mid_base + mid_bytes;

        Heap {
            lo: PoolDescriptor::compute(lo_base, lo_bytes, CHUNK_SIZE_LO),
            mid: PoolDescriptor::compute(mid_base, mid_bytes, CHUNK_SIZE_MID),
            hi: PoolDescriptor::compute(hi_base, hi_bytes, CHUNK_SIZE_HI),
        }
    }

    /// Choose the pool whose chunk size covers `size` (spec §4.4 step 1):
    /// the smallest pool that fits, or the largest if `size` exceeds every
    /// chunk size (multiple contiguous `hi` chunks are then used).
    fn pool_for(&self, size: u32) -> &PoolDescriptor {
        if size <= CHUNK_SIZE_LO {
            &self.lo
        } else if size <= CHUNK_SIZE_MID {
            &self.mid
        } else {
            &self.hi
        }
    }

    fn pool_owning(&self, addr: u32) -> Option<&PoolDescriptor> {
        if self.lo.owns(addr) {
            Some(&self.lo)
        } else if self.mid.owns(addr) {
            Some(&self.mid)
        } else if self.hi.owns(addr) {
            Some(&self.hi)
        } else {
            None
        }
    }

    fn allocate(&self, size: u32, alignment: u32) -> *mut u8 {
        let pool = self.pool_for(size);
        let chunks_needed = (size + pool.chunk_size - 1) / pool.chunk_size;
        let Some(start) = pool.find_run(chunks_needed, alignment) else {
            return ptr::null_mut();
        };

        pool.set_used(start - 1);
        for i in start..start + chunks_needed {
            pool.set_used(i);
        }

        let metadata = AllocationMetadata {
            signature: ALLOCATION_SIGNATURE,
            size,
            chunksize: pool.chunk_size,
            alignment,
        };
        unsafe {
            (pool.chunk_addr(start - 1) as *mut AllocationMetadata).write(metadata);
        }
        pool.chunk_addr(start) as *mut u8
    }

    fn free(&self, addr: u32) {
        let Some(pool) = self.pool_owning(addr) else {
            log::error!("gallocator: kfree on address outside any pool: {:#x}", addr);
            return;
        };
        let chunk_index = (addr - pool.pool_base) / pool.chunk_size;
        if chunk_index == 0 {
            log::error!("gallocator: kfree on sentinel chunk {:#x}", addr);
            return;
        }
        let metadata = unsafe {
            (pool.chunk_addr(chunk_index - 1) as *const AllocationMetadata).read()
        };
        if metadata.signature != ALLOCATION_SIGNATURE {
            log::error!("gallocator: kfree signature mismatch at {:#x}", addr);
            return;
        }
        let chunks_used = (metadata.size + metadata.chunksize - 1) / metadata.chunksize;
        pool.set_free(chunk_index - 1);
        for i in chunk_index..chunk_index + chunks_used {
            pool.set_free(i);
        }
    }

    fn metadata_for(&self, addr: u32) -> Option<AllocationMetadata> {
        let pool = self.pool_owning(addr)?;
        let chunk_index = (addr - pool.pool_base) / pool.chunk_size;
        let metadata =
            unsafe { (pool.chunk_addr(chunk_index - 1) as *const AllocationMetadata).read() };
        if metadata.signature == ALLOCATION_SIGNATURE {
            Some(metadata)
        } else {
            None
        }
    }
}

const MAX_HEAPS: usize = 4;

struct Registry {
    heaps: [Option<Heap>; MAX_HEAPS],
    active: usize,
}

static REGISTRY: SpinLock<Registry> = SpinLock::new(Registry {
    heaps: [None, None, None, None],
    active: 0,
});

/// Register a new heap over `[base, base+size)` and return its id. The
/// first heap registered (the bootstrap heap) becomes active by default.
fn register_heap(base: u32, size: u32) -> usize {
    let mut registry = REGISTRY.lock();
    let id = registry
        .heaps
        .iter()
        .position(Option::is_none)
        .expect("gallocator: heap registry full");
    registry.heaps[id] = Some(Heap::new(base, size));
    id
}

/// `kmalloc_use_heap` (spec §4.4): swap the active heap.
pub fn kmalloc_use_heap(id: usize) {
    REGISTRY.lock().active = id;
}

/// `{lo, mid, hi}` chunk usage for the heap registered under `heap_id`
/// (spec §4.4b), or `None` if no heap is registered there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub lo: PoolStats,
    pub mid: PoolStats,
    pub hi: PoolStats,
}

pub fn kmalloc_heap_stats(heap_id: usize) -> Option<HeapStats> {
    let registry = REGISTRY.lock();
    let heap = registry.heaps.get(heap_id)?.as_ref()?;
    Some(HeapStats {
        lo: heap.lo.stats(),
        mid: heap.mid.stats(),
        hi: heap.hi.stats(),
    })
}

#[repr(align(16))]
struct BootstrapRegion([u8; BOOTSTRAP_HEAP_SIZE]);

static mut BOOTSTRAP_REGION: BootstrapRegion = BootstrapRegion([0; BOOTSTRAP_HEAP_SIZE]);

/// Register the statically reserved bootstrap heap (spec §4.4). Must run
/// before the first `kmalloc` call; `extern crate alloc` users rely on the
/// global allocator being backed by *some* heap from the moment the
/// kernel enters Rust code proper.
pub fn init_bootstrap_heap() {
    #[allow(static_mut_refs)]
    let base = unsafe { BOOTSTRAP_REGION.0.as_mut_ptr() as u32 };
    let id = register_heap(base, BOOTSTRAP_HEAP_SIZE as u32);
    kmalloc_use_heap(id);
    log::info!(
        "gallocator: bootstrap heap registered at {:#x}, {} KiB",
        base,
        BOOTSTRAP_HEAP_SIZE / 1024
    );
}

/// Register the real kernel heap over `[base, base+size)` and make it
/// active; the bootstrap heap remains registered but unused (spec §4.4).
pub fn init_main_heap(base: u32, size: u32) {
    let id = register_heap(base, size);
    kmalloc_use_heap(id);
    log::info!("gallocator: main heap registered at {:#x}, {} KiB", base, size / 1024);
}

/// `kmalloc` (spec §4.4): default-aligned allocation against the active
/// heap.
pub unsafe fn kmalloc(size: usize) -> *mut u8 {
    kmalloc_aligned(size, DEFAULT_ALIGNMENT as usize)
}

/// `kmalloc_aligned` (spec §4.4). Returns null for `size == 0` or on
/// allocation failure.
pub unsafe fn kmalloc_aligned(size: usize, alignment: usize) -> *mut u8 {
    if size == 0 {
        return ptr::null_mut();
    }
    let registry = REGISTRY.lock();
    match &registry.heaps[registry.active] {
        Some(heap) => heap.allocate(size as u32, alignment as u32),
        None => ptr::null_mut(),
    }
}

/// `kfree` (spec §4.4).
pub unsafe fn kfree(addr: *mut u8) {
    if addr.is_null() {
        return;
    }
    let registry = REGISTRY.lock();
    match &registry.heaps[registry.active] {
        Some(heap) => heap.free(addr as u32),
        None => log::error!("gallocator: kfree with no active heap"),
    }
}

/// `krealloc` (spec §4.4): default strategy — allocate new, copy
/// `min(old_size, new_size)`, free old.
pub unsafe fn krealloc(addr: *mut u8, new_size: usize) -> *mut u8 {
    if addr.is_null() {
        return kmalloc(new_size);
    }
    let registry = REGISTRY.lock();
    let old_size = match &registry.heaps[registry.active] {
        Some(heap) => heap.metadata_for(addr as u32).map(|m| m.size as usize),
        None => None,
    };
    drop(registry);

    let Some(old_size) = old_size else {
        return ptr::null_mut();
    };

    let new_ptr = kmalloc_aligned(new_size, DEFAULT_ALIGNMENT as usize);
    if !new_ptr.is_null() {
        let copy_len = old_size.min(new_size);
        ptr::copy_nonoverlapping(addr, new_ptr, copy_len);
        kfree(addr);
    }
    new_ptr
}

struct Gallocator;

unsafe impl GlobalAlloc for Gallocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        kmalloc_aligned(layout.size(), layout.align())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        kfree(ptr)
    }
}

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: Gallocator = Gallocator;

#[cfg(not(test))]
#[alloc_error_handler]
fn alloc_error_handler(layout: Layout) -> ! {
    panic!("gallocator: out of memory allocating {:?}", layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(16))]
    struct TestRegion([u8; 8192]);

    #[test]
    fn alloc_and_free_round_trips() {
        let mut region = TestRegion([0; 8192]);
        let heap = Heap::new(region.0.as_mut_ptr() as u32, 8192);

        let a = heap.allocate(16, 8);
        assert!(!a.is_null());
        let b = heap.allocate(16, 8);
        assert!(!b.is_null());
        assert_ne!(a, b);

        heap.free(a as u32);
        let c = heap.allocate(16, 8);
        assert!(!c.is_null());
    }

    #[test]
    fn oversized_allocation_uses_hi_pool_multiple_chunks() {
        let mut region = TestRegion([0; 8192]);
        let heap = Heap::new(region.0.as_mut_ptr() as u32, 8192);
        let p = heap.allocate(200, 8);
        assert!(!p.is_null());
        assert_eq!((p as u32 - heap.hi.pool_base) % heap.hi.chunk_size, 0);
    }

    #[test]
    fn zero_size_allocation_returns_null() {
        let mut region = TestRegion([0; 8192]);
        let heap = Heap::new(region.0.as_mut_ptr() as u32, 8192);
        assert!(heap.allocate(0, 8).is_null());
    }

    #[test]
    fn signature_mismatch_free_does_not_corrupt_bitmap() {
        let mut region = TestRegion([0; 8192]);
        let heap = Heap::new(region.0.as_mut_ptr() as u32, 8192);
        heap.free(heap.lo.chunk_addr(5));
    }

    #[test]
    fn pool_stats_reflect_allocation_and_free() {
        let mut region = TestRegion([0; 8192]);
        let heap = Heap::new(region.0.as_mut_ptr() as u32, 8192);

        let before = heap.lo.stats();
        let p = heap.allocate(16, 8);
        assert!(!p.is_null());
        let after_alloc = heap.lo.stats();
        assert_eq!(after_alloc.used_chunks, before.used_chunks + 2);

        heap.free(p as u32);
        let after_free = heap.lo.stats();
        assert_eq!(after_free.used_chunks, before.used_chunks);
    }

    #[test]
    fn kmalloc_heap_stats_reports_none_for_unregistered_id() {
        assert!(kmalloc_heap_stats(MAX_HEAPS + 1).is_none());
    }
}

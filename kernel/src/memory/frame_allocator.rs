//! Physical frame allocator (spec §4.1): a bitmap over
//! `[0, max_phys_addr / PAGE_SIZE)`, filtered down by the Multiboot
//! memory map's usable regions. A bitmap rather than a sequential
//! next-frame cursor, since the tie-break rule ("lowest free index") and
//! the fault arbiter's `falloc_one_at` both need random-access bit tests
//! a simple cursor can't provide.

use crate::arch::x86::constants::PAGE_SIZE;
use crate::multiboot::MemoryMap;
use crate::spinlock::SpinLock;
use alloc::vec::Vec;

/// Never hand out frame 0 or anything below 1 MiB: frame 0 collides with
/// "null physical address", and the 0–1 MiB range holds BIOS/legacy
/// device memory this kernel doesn't model.
const LOW_MEMORY_FLOOR: u64 = 0x10_0000;

struct Bitmap {
    bits: Vec<u64>,
    frame_count: usize,
}

impl Bitmap {
    fn new(frame_count: usize) -> Self {
        let words = (frame_count + 63) / 64;
        Bitmap {
            bits: alloc::vec![!0u64; words],
            frame_count,
        }
    }

    fn is_free(&self, frame: usize) -> bool {
        self.bits[frame / 64] & (1 << (frame % 64)) != 0
    }

    fn clear(&mut self, frame: usize) {
        self.bits[frame / 64] &= !(1 << (frame % 64));
    }

    fn set(&mut self, frame: usize) {
        self.bits[frame / 64] |= 1 << (frame % 64);
    }

    fn free_count(&self) -> usize {
        (0..self.frame_count).filter(|&f| self.is_free(f)).count()
    }

    /// Lowest-index free frame (spec §4.1 tie-break).
    fn lowest_free(&self) -> Option<usize> {
        for (word_idx, word) in self.bits.iter().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                let frame = word_idx * 64 + bit;
                if frame < self.frame_count {
                    return Some(frame);
                }
            }
        }
        None
    }
}

struct State {
    bitmap: Bitmap,
}

static STATE: SpinLock<Option<State>> = SpinLock::new(None);

fn frame_to_paddr(frame: usize) -> u32 {
    (frame as u32) * PAGE_SIZE
}

fn paddr_to_frame(paddr: u32) -> usize {
    (paddr / PAGE_SIZE) as usize
}

/// Build the bitmap from the filtered Multiboot memory map, marking every
/// frame in an available region (at or above `LOW_MEMORY_FLOOR`) free.
pub fn init(memory_map: &MemoryMap) {
    let max_addr = memory_map
        .iter()
        .map(|r| r.base + r.length)
        .max()
        .unwrap_or(0);
    let frame_count = (max_addr / PAGE_SIZE as u64) as usize;

    let mut bitmap = Bitmap::new(frame_count.max(1));
    // Start fully reserved; mark available regions free.
    for frame in 0..bitmap.frame_count {
        bitmap.clear(frame);
    }
    for region in memory_map.iter() {
        if !region.available {
            continue;
        }
        let start = region.base.max(LOW_MEMORY_FLOOR);
        let end = region.base + region.length;
        if end <= start {
            continue;
        }
        let first_frame = (start / PAGE_SIZE as u64) as usize;
        let last_frame = ((end - 1) / PAGE_SIZE as u64) as usize;
        for frame in first_frame..=last_frame.min(bitmap.frame_count.saturating_sub(1)) {
            bitmap.set(frame);
        }
    }

    *STATE.lock() = Some(State { bitmap });
}

/// `falloc_one` (spec §4.1): lowest-index free frame, or 0 if none.
/// Frames are never zeroed.
pub fn falloc_one() -> u32 {
    let mut state = STATE.lock();
    let state = state.as_mut().expect("frame allocator not initialized");
    match state.bitmap.lowest_free() {
        Some(frame) => {
            state.bitmap.clear(frame);
            frame_to_paddr(frame)
        }
        None => 0,
    }
}

/// `falloc_one_at` (spec §4.1): mark the specific frame used; fails if
/// already allocated.
pub fn falloc_one_at(paddr: u32) -> Result<(), crate::errno::KError> {
    let mut state = STATE.lock();
    let state = state.as_mut().expect("frame allocator not initialized");
    let frame = paddr_to_frame(paddr);
    if frame >= state.bitmap.frame_count || !state.bitmap.is_free(frame) {
        return Err(crate::errno::KError::Busy);
    }
    state.bitmap.clear(frame);
    Ok(())
}

/// `falloc_one_user` (spec §4.1): same policy as `falloc_one` — this
/// kernel has no zone split, so there is no separate user pool to prefer.
pub fn falloc_one_user() -> u32 {
    falloc_one()
}

/// `ffree_one` (spec §4.1).
pub fn ffree_one(paddr: u32) {
    let mut state = STATE.lock();
    let state = state.as_mut().expect("frame allocator not initialized");
    state.bitmap.set(paddr_to_frame(paddr));
}

/// `{total_frames, free_frames}` (spec §4.1b), for diagnostics and tests
/// that want a count without walking the bitmap themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallocStats {
    pub total_frames: usize,
    pub free_frames: usize,
}

pub fn falloc_stats() -> FallocStats {
    let mut state = STATE.lock();
    let state = state.as_mut().expect("frame allocator not initialized");
    FallocStats {
        total_frames: state.bitmap.frame_count,
        free_frames: state.bitmap.free_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_test_bitmap(frame_count: usize, f: impl FnOnce(&mut Bitmap)) {
        let mut bitmap = Bitmap::new(frame_count);
        for frame in 0..frame_count {
            bitmap.clear(frame);
        }
        f(&mut bitmap);
    }

    #[test]
    fn lowest_free_prefers_smallest_index() {
        with_test_bitmap(128, |bitmap| {
            bitmap.set(0);
            bitmap.set(1);
            assert_eq!(bitmap.lowest_free(), Some(2));
        });
    }

    #[test]
    fn clear_then_set_round_trips() {
        with_test_bitmap(65, |bitmap| {
            assert!(bitmap.is_free(64));
            bitmap.set(64);
            assert!(!bitmap.is_free(64));
            bitmap.clear(64);
            assert!(bitmap.is_free(64));
        });
    }

    #[test]
    fn frame_paddr_round_trip() {
        assert_eq!(paddr_to_frame(frame_to_paddr(42)), 42);
    }

    #[test]
    fn free_count_tracks_cleared_bits() {
        with_test_bitmap(128, |bitmap| {
            assert_eq!(bitmap.free_count(), 128);
            bitmap.set(5);
            bitmap.set(6);
            assert_eq!(bitmap.free_count(), 126);
        });
    }

    #[test]
    fn init_marks_only_available_regions_free() {
        use crate::multiboot::{MemoryMap, MemoryRegion, MAX_REGIONS};

        let mut regions = [MemoryRegion {
            base: 0,
            length: 0,
            available: false,
        }; MAX_REGIONS];
        // One usable region above the low-memory floor, sized to an exact
        // number of frames; everything else in the reported address space
        // (including the unlisted range below it) must come back reserved.
        regions[0] = MemoryRegion {
            base: LOW_MEMORY_FLOOR,
            length: 16 * PAGE_SIZE as u64,
            available: true,
        };
        let memory_map = MemoryMap { regions, count: 1 };

        init(&memory_map);
        let stats = falloc_stats();
        assert_eq!(stats.free_frames, 16);
    }
}

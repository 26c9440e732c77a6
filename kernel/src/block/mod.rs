//! Block-Device Manager (spec §4.8).
//!
//! A `BlockDevice` trait (`read_block`/`write_block`/`block_size`/
//! `num_blocks`/`flush`) as the raw-device interface, LBA-addressed.
//! Beyond that: a driver registry, MBR partition enumeration, and
//! by-name/UUID resolution, so more than one concrete backing device can
//! register and be found again by name.

use crate::errno::{KError, KResult};
use crate::spinlock::SpinLock;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

pub const SECTOR_SIZE: usize = 512;

/// Raw device backing, implemented by a concrete driver (e.g. PATA/IDE).
/// `lba` is always relative to the start of the physical device; partition
/// offsetting happens one layer up, in the registry.
pub trait BlockDevice: Send + Sync {
    fn read(&self, lba: u64, buf: &mut [u8]) -> Result<(), BlockError>;
    fn write(&self, lba: u64, buf: &[u8]) -> Result<(), BlockError>;
    fn sector_count(&self) -> u64;
    fn flush(&self) -> Result<(), BlockError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    IoError,
    OutOfBounds,
    DeviceNotReady,
    Timeout,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::IoError => write!(f, "I/O error"),
            BlockError::OutOfBounds => write!(f, "block number out of bounds"),
            BlockError::DeviceNotReady => write!(f, "device not ready"),
            BlockError::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl From<BlockError> for KError {
    fn from(e: BlockError) -> Self {
        match e {
            BlockError::IoError => KError::Io,
            BlockError::OutOfBounds => KError::Invalid,
            BlockError::DeviceNotReady => KError::NoDevice,
            BlockError::Timeout => KError::TimedOut,
        }
    }
}

/// `{parent, offset_lba, sector_count, sectorsize, suffix, uuid, read, write}`
/// (spec §4.8 "Block device"). The raw disk itself is also kept in this
/// registry, as the partition with `offset_lba = 0` and `parent_name = None`
/// — `read_by_name`/`write_by_name` need to address whole disks and
/// partitions through the same lookup.
struct Entry {
    name: String,
    parent_name: Option<String>,
    device: Arc<dyn BlockDevice>,
    offset_lba: u64,
    sector_count: u64,
    uuid: u32,
}

struct State {
    entries: Vec<Entry>,
}

static STATE: SpinLock<Option<State>> = SpinLock::new(None);

pub fn init() {
    *STATE.lock() = Some(State {
        entries: Vec::new(),
    });
    log::info!("block: device manager initialized");
    // PATA/IDE drives sit on fixed legacy ISA ports, not behind PCI
    // enumeration, so they're brought up here rather than through
    // `drivers::pci`'s (class, subclass) driver-binding path.
    crate::drivers::ata::init();
}

/// Register a raw device (e.g. one IDE drive) under `name` and run MBR
/// partition enumeration over it, matching PATA identification step 7
/// ("register via the block-device manager and trigger partition
/// enumeration").
pub fn register_device(name: &str, device: Arc<dyn BlockDevice>) -> KResult<()> {
    let sector_count = device.sector_count();
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("block::init must run first");
    if state.entries.iter().any(|e| e.name == name) {
        return Err(KError::Exists);
    }
    state.entries.push(Entry {
        name: name.to_string(),
        parent_name: None,
        device,
        offset_lba: 0,
        sector_count,
        uuid: 0,
    });
    drop(guard);
    log::info!("block: registered {} ({} sectors)", name, sector_count);
    enumerate_partitions(name)
}

/// `blkdevm_enumerate_partitions(dev)` (spec §4.8).
pub fn enumerate_partitions(name: &str) -> KResult<()> {
    let mut sector0 = [0u8; SECTOR_SIZE];
    read_by_name(name, 0, &mut sector0)?;

    if u16::from_le_bytes([sector0[510], sector0[511]]) != 0xAA55 {
        return Ok(());
    }
    let disk_signature = u32::from_le_bytes([
        sector0[440],
        sector0[441],
        sector0[442],
        sector0[443],
    ]);

    let mut fresh = Vec::new();
    for i in 0..4u32 {
        let base = 446 + (i as usize) * 16;
        let entry = &sector0[base..base + 16];
        let lba_start = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]) as u64;
        let sector_count = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]) as u64;
        if lba_start == 0 || sector_count == 0 {
            continue;
        }
        fresh.push((i + 1, lba_start, sector_count));
    }

    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("block::init must run first");
    let device = state
        .entries
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.device.clone())
        .ok_or(KError::NotFound)?;

    // Rule 4: remove any previously registered children of `dev` before
    // adding the freshly parsed partitions.
    state
        .entries
        .retain(|e| e.parent_name.as_deref() != Some(name));

    for (index, offset_lba, sector_count) in fresh {
        state.entries.push(Entry {
            name: alloc::format!("{}p{}", name, index),
            parent_name: Some(name.to_string()),
            device: device.clone(),
            offset_lba,
            sector_count,
            // Partition UUID derived from the disk signature and index in
            // a stable way (spec §4.8 rule 5).
            uuid: disk_signature ^ index,
        });
    }
    Ok(())
}

fn find<'a>(state: &'a State, id: &str) -> Option<&'a Entry> {
    if let Some(hex) = id.strip_prefix("UUID=") {
        let target = u32::from_str_radix(hex, 16).ok()?;
        state.entries.iter().find(|e| e.uuid == target)
    } else {
        state.entries.iter().find(|e| e.name == id)
    }
}

/// Generic partition I/O: `read(dev, lba, buf)` redirects to
/// `dev.parent.read(dev.offset + lba, buf)` (spec §4.8).
pub fn read_by_name(id: &str, lba: u64, buf: &mut [u8]) -> KResult<usize> {
    let guard = STATE.lock();
    let state = guard.as_ref().expect("block::init must run first");
    let entry = find(state, id).ok_or(KError::NotFound)?;
    if lba >= entry.sector_count {
        return Err(KError::Invalid);
    }
    entry.device.read(entry.offset_lba + lba, buf)?;
    Ok(buf.len())
}

pub fn write_by_name(id: &str, lba: u64, buf: &mut [u8]) -> KResult<usize> {
    let guard = STATE.lock();
    let state = guard.as_ref().expect("block::init must run first");
    let entry = find(state, id).ok_or(KError::NotFound)?;
    if lba >= entry.sector_count {
        return Err(KError::Invalid);
    }
    entry.device.write(entry.offset_lba + lba, buf)?;
    Ok(buf.len())
}

pub fn device_names() -> Vec<String> {
    let guard = STATE.lock();
    let state = guard.as_ref().expect("block::init must run first");
    state.entries.iter().map(|e| e.name.clone()).collect()
}

pub fn device_size_bytes(id: &str) -> Option<u64> {
    let guard = STATE.lock();
    let state = guard.as_ref()?;
    find(state, id).map(|e| e.sector_count * SECTOR_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spinlock::SpinLock as Lock;

    struct FakeDisk {
        sectors: Lock<Vec<[u8; SECTOR_SIZE]>>,
    }

    impl BlockDevice for FakeDisk {
        fn read(&self, lba: u64, buf: &mut [u8]) -> Result<(), BlockError> {
            let sectors = self.sectors.lock();
            let sector = sectors.get(lba as usize).ok_or(BlockError::OutOfBounds)?;
            buf[..SECTOR_SIZE].copy_from_slice(sector);
            Ok(())
        }
        fn write(&self, lba: u64, buf: &[u8]) -> Result<(), BlockError> {
            let mut sectors = self.sectors.lock();
            let sector = sectors
                .get_mut(lba as usize)
                .ok_or(BlockError::OutOfBounds)?;
            sector.copy_from_slice(&buf[..SECTOR_SIZE]);
            Ok(())
        }
        fn sector_count(&self) -> u64 {
            self.sectors.lock().len() as u64
        }
    }

    fn disk_with_one_partition() -> Arc<FakeDisk> {
        let mut sectors = alloc::vec![[0u8; SECTOR_SIZE]; 4096];
        sectors[0][510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
        let entry0 = &mut sectors[0][446..462];
        entry0[8..12].copy_from_slice(&2048u32.to_le_bytes());
        entry0[12..16].copy_from_slice(&512u32.to_le_bytes());
        Arc::new(FakeDisk {
            sectors: Lock::new(sectors),
        })
    }

    #[test]
    fn mbr_with_one_partition_registers_exactly_one_child() {
        init();
        register_device("hda", disk_with_one_partition()).unwrap();
        let names = device_names();
        assert!(names.contains(&"hda".to_string()));
        assert!(names.contains(&"hdap1".to_string()));
        assert_eq!(names.len(), 2);
        assert_eq!(device_size_bytes("hdap1").unwrap(), 512 * SECTOR_SIZE as u64);
    }

    #[test]
    fn rescanning_drops_previous_partitions() {
        init();
        register_device("hda", disk_with_one_partition()).unwrap();
        enumerate_partitions("hda").unwrap();
        let names = device_names();
        assert_eq!(names.iter().filter(|n| n.starts_with("hdap")).count(), 1);
    }

    #[test]
    fn partition_read_redirects_through_offset() {
        init();
        let disk = disk_with_one_partition();
        {
            let mut sectors = disk.sectors.lock();
            sectors[2048][0] = 0x42;
        }
        register_device("hda", disk).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        read_by_name("hdap1", 0, &mut buf).unwrap();
        assert_eq!(buf[0], 0x42);
    }
}

//! PATA/IDE driver (spec §4.10), the representative concrete block driver
//! bound under `block::` rather than through PCI driver binding — these
//! are the legacy fixed ISA I/O ports (`0x1F0`/`0x170`), not a PCI device
//! in the strict sense, so `block::init` calls `ata::init()` directly
//! instead of waiting on a `(class, subclass)` match from `drivers::pci`.
//!
//! Register access goes through `arch::x86::io::X86Io`'s `PortIo`
//! primitives, same as every other port-mapped device in this kernel;
//! the identify/PIO state machine itself follows standard IDE timing
//! rules (`IDENTIFY`, then polled `PIO` reads/writes with status-register
//! waits between each).

use crate::arch::traits::PortIo;
use crate::arch::x86::io::{io_wait, X86Io};
use crate::block::{self, BlockDevice, BlockError};
use crate::interrupts::timer;
use alloc::string::String;
use alloc::sync::Arc;

const IDENTIFY_TIMEOUT_MS: u64 = 200;

const STATUS_ERR: u8 = 0x01;
const STATUS_DRQ: u8 = 0x08;
const STATUS_BSY: u8 = 0x80;

struct Channel {
    base: u16,
    ctrl: u16,
}

const CHANNELS: [Channel; 2] = [
    Channel {
        base: 0x1F0,
        ctrl: 0x3F6,
    },
    Channel {
        base: 0x170,
        ctrl: 0x376,
    },
];

const DRIVE_SELECT: [u8; 2] = [0xA0, 0xB0];

fn status(channel: &Channel) -> u8 {
    unsafe { X86Io::in_u8(channel.base + 7) }
}

fn wait_not_busy(channel: &Channel, timeout_ms: u64) -> Result<(), BlockError> {
    let deadline = timer::millis() + timeout_ms;
    while status(channel) & STATUS_BSY != 0 {
        if timer::millis() > deadline {
            return Err(BlockError::Timeout);
        }
    }
    Ok(())
}

fn wait_drq_or_err(channel: &Channel, timeout_ms: u64) -> Result<(), BlockError> {
    let deadline = timer::millis() + timeout_ms;
    loop {
        let s = status(channel);
        if s & STATUS_ERR != 0 {
            return Err(BlockError::IoError);
        }
        if s & STATUS_DRQ != 0 {
            return Ok(());
        }
        if timer::millis() > deadline {
            return Err(BlockError::Timeout);
        }
    }
}

struct IdentifyResult {
    sector_count: u64,
    lba48: bool,
}

/// One IDENTIFY DEVICE (0xEC) probe. Returns `Ok(None)` for "no device at
/// this select" (status read as 0) or "is ATAPI/SATA" (non-zero LBA-mid/hi
/// after BSY clears) — both are non-errors, just absence of a PATA drive.
fn identify(channel: &Channel, drive_select: u8) -> Result<Option<IdentifyResult>, BlockError> {
    unsafe {
        X86Io::out_u8(channel.base + 6, drive_select);
        X86Io::out_u8(channel.base + 2, 0);
        X86Io::out_u8(channel.base + 3, 0);
        X86Io::out_u8(channel.base + 4, 0);
        X86Io::out_u8(channel.base + 5, 0);
        X86Io::out_u8(channel.base + 7, 0xEC);
    }

    if status(channel) == 0 {
        return Ok(None);
    }

    wait_not_busy(channel, IDENTIFY_TIMEOUT_MS)?;

    let lba_mid = unsafe { X86Io::in_u8(channel.base + 4) };
    let lba_hi = unsafe { X86Io::in_u8(channel.base + 5) };
    if lba_mid != 0 || lba_hi != 0 {
        // SATA/ATAPI signature, not a PATA hard drive.
        return Ok(None);
    }

    wait_drq_or_err(channel, IDENTIFY_TIMEOUT_MS)?;

    let mut words = [0u16; 256];
    for word in words.iter_mut() {
        *word = unsafe { X86Io::in_u16(channel.base) };
    }

    let lba28 = (words[60] as u32) | ((words[61] as u32) << 16);
    let lba48_supported = words[83] & (1 << 10) != 0;
    let lba48 = if lba48_supported {
        (words[100] as u64)
            | ((words[101] as u64) << 16)
            | ((words[102] as u64) << 32)
            | ((words[103] as u64) << 48)
    } else {
        0
    };

    Ok(Some(IdentifyResult {
        sector_count: if lba48_supported { lba48 } else { lba28 as u64 },
        lba48: lba48_supported,
    }))
}

pub struct AtaDevice {
    base: u16,
    drive_select: u8,
    lba48: bool,
    sector_count: u64,
}

impl AtaDevice {
    fn select_lba(&self, lba: u64, sector_count: u16) {
        unsafe {
            if self.lba48 {
                X86Io::out_u8(self.base + 6, self.drive_select | 0x40);
                X86Io::out_u8(self.base + 2, (sector_count >> 8) as u8);
                X86Io::out_u8(self.base + 3, (lba >> 24) as u8);
                X86Io::out_u8(self.base + 4, (lba >> 32) as u8);
                X86Io::out_u8(self.base + 5, (lba >> 40) as u8);
                X86Io::out_u8(self.base + 2, sector_count as u8);
                X86Io::out_u8(self.base + 3, lba as u8);
                X86Io::out_u8(self.base + 4, (lba >> 8) as u8);
                X86Io::out_u8(self.base + 5, (lba >> 16) as u8);
            } else {
                X86Io::out_u8(
                    self.base + 6,
                    self.drive_select | 0x40 | (((lba >> 24) & 0x0F) as u8),
                );
                X86Io::out_u8(self.base + 2, sector_count as u8);
                X86Io::out_u8(self.base + 3, lba as u8);
                X86Io::out_u8(self.base + 4, (lba >> 8) as u8);
                X86Io::out_u8(self.base + 5, (lba >> 16) as u8);
            }
        }
    }

    fn channel(&self) -> Channel {
        Channel {
            base: self.base,
            ctrl: self.base + 0x206,
        }
    }

    fn pio_transfer(&self, lba: u64, buf: &mut [u8], write: bool) -> Result<(), BlockError> {
        if buf.len() % block::SECTOR_SIZE != 0 {
            return Err(BlockError::OutOfBounds);
        }
        let total_sectors = (buf.len() / block::SECTOR_SIZE) as u64;
        if lba + total_sectors > self.sector_count {
            return Err(BlockError::OutOfBounds);
        }

        let channel = self.channel();
        let mut remaining = total_sectors;
        let mut cur_lba = lba;
        let mut offset = 0usize;

        while remaining > 0 {
            let chunk = core::cmp::min(remaining, 256) as u16;
            self.select_lba(cur_lba, chunk);
            let command: u8 = match (self.lba48, write) {
                (true, false) => 0x24,
                (true, true) => 0x34,
                (false, false) => 0x20,
                (false, true) => 0x30,
            };
            unsafe { X86Io::out_u8(channel.base + 7, command) };

            for sector in 0..chunk {
                if sector != 0 {
                    io_wait();
                }
                wait_not_busy(&channel, IDENTIFY_TIMEOUT_MS)?;
                wait_drq_or_err(&channel, IDENTIFY_TIMEOUT_MS)?;

                let sector_buf = &mut buf[offset..offset + block::SECTOR_SIZE];
                if write {
                    for chunk2 in sector_buf.chunks_exact(2) {
                        let word = u16::from_le_bytes([chunk2[0], chunk2[1]]);
                        unsafe { X86Io::out_u16(channel.base, word) };
                    }
                } else {
                    for chunk2 in sector_buf.chunks_exact_mut(2) {
                        let word = unsafe { X86Io::in_u16(channel.base) };
                        chunk2.copy_from_slice(&word.to_le_bytes());
                    }
                }
                offset += block::SECTOR_SIZE;
            }

            if write {
                unsafe { X86Io::out_u8(channel.base + 7, 0xE7) };
                wait_not_busy(&channel, IDENTIFY_TIMEOUT_MS)?;
            }

            cur_lba += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(())
    }
}

impl BlockDevice for AtaDevice {
    fn read(&self, lba: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        self.pio_transfer(lba, buf, false)
    }

    fn write(&self, lba: u64, buf: &[u8]) -> Result<(), BlockError> {
        // `pio_transfer` takes `&mut [u8]` to share the read path's sector
        // loop; a write only ever reads from this copy.
        let mut owned = buf.to_vec();
        self.pio_transfer(lba, &mut owned, true)
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }
}

/// Probe both legacy channels and both drive selects, registering every
/// PATA hard drive found as `hd{a..z}` (spec §4.10 step 7).
pub fn init() {
    let mut next_name = b'a';
    for channel in CHANNELS.iter() {
        for &drive_select in DRIVE_SELECT.iter() {
            let result = match identify(channel, drive_select) {
                Ok(Some(r)) => r,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("ata: identify failed on {:#x}/{:#x}: {}", channel.base, drive_select, e);
                    continue;
                }
            };

            let name: String = alloc::format!("hd{}", next_name as char);
            next_name += 1;

            let device = Arc::new(AtaDevice {
                base: channel.base,
                drive_select,
                lba48: result.lba48,
                sector_count: result.sector_count,
            });
            log::info!(
                "ata: {} {} sectors (lba48={})",
                name,
                result.sector_count,
                result.lba48
            );
            if let Err(e) = block::register_device(&name, device) {
                log::warn!("ata: failed to register {}: {:?}", name, e);
            }
        }
    }
}

//! PCI Bus Enumeration and Device Discovery (spec §4.9).
//!
//! PCI configuration space access uses two I/O ports:
//! - CONFIG_ADDRESS (0xCF8): write the address of the register to read/write
//! - CONFIG_DATA (0xCFC): read/write the configuration data
//!
//! ```text
//! Bit 31    : Enable bit (must be 1)
//! Bits 23-16: Bus number (0-255)
//! Bits 15-11: Device number (0-31)
//! Bits 10-8 : Function number (0-7)
//! Bits 7-2  : Register offset (32-bit aligned)
//! ```

use crate::arch::traits::PortIo;
use crate::arch::x86::io::X86Io;
use crate::spinlock::SpinLock;
use alloc::vec::Vec;

const CONFIG_ADDRESS: u16 = 0xCF8;
const CONFIG_DATA: u16 = 0xCFC;
const MAX_DEVICE: u8 = 32;

/// Base Address Register, decoded from config space offsets 0x10-0x24.
#[derive(Debug, Clone, Copy)]
pub struct Bar {
    pub address: u64,
    pub size: u64,
    pub is_io: bool,
    pub is_64bit: bool,
    pub prefetchable: bool,
}

impl Bar {
    const fn empty() -> Self {
        Bar {
            address: 0,
            size: 0,
            is_io: false,
            is_64bit: false,
            prefetchable: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.size > 0
    }
}

/// A driver that can claim devices of a given (class, subclass). Bound via
/// `pci_register_device_driver` (spec §4.9 "Driver binding").
pub struct PciDriver {
    pub name: &'static str,
    pub class: u8,
    pub subclass: u8,
    pub probe: fn(&Device) -> bool,
}

#[derive(Clone)]
pub struct Device {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    pub revision_id: u8,
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub header_type: u8,
    pub multifunction: bool,
    pub bars: [Bar; 6],
    pub driver: Option<&'static str>,
}

impl Device {
    pub fn config_read_dword(&self, offset: u8) -> u32 {
        pci_read_config_dword(self.bus, self.device, self.function, offset)
    }

    pub fn config_write_dword(&self, offset: u8, value: u32) {
        pci_write_config_dword(self.bus, self.device, self.function, offset, value);
    }

    pub fn get_mmio_bar(&self) -> Option<&Bar> {
        self.bars.iter().find(|bar| bar.is_valid() && !bar.is_io)
    }

    pub fn get_io_bar(&self) -> Option<&Bar> {
        self.bars.iter().find(|bar| bar.is_valid() && bar.is_io)
    }

    pub fn enable_bus_master(&self) {
        let command = pci_read_config_word(self.bus, self.device, self.function, 0x04);
        pci_write_config_word(self.bus, self.device, self.function, 0x04, command | 0x04);
    }
}

fn pci_address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    0x8000_0000
        | ((bus as u32) << 16)
        | ((device as u32) << 11)
        | ((function as u32) << 8)
        | ((offset & 0xFC) as u32)
}

fn pci_read_config_dword(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    unsafe {
        X86Io::out_u32(CONFIG_ADDRESS, pci_address(bus, device, function, offset));
        X86Io::in_u32(CONFIG_DATA)
    }
}

fn pci_write_config_dword(bus: u8, device: u8, function: u8, offset: u8, value: u32) {
    unsafe {
        X86Io::out_u32(CONFIG_ADDRESS, pci_address(bus, device, function, offset));
        X86Io::out_u32(CONFIG_DATA, value);
    }
}

fn pci_read_config_word(bus: u8, device: u8, function: u8, offset: u8) -> u16 {
    let dword = pci_read_config_dword(bus, device, function, offset & 0xFC);
    ((dword >> ((offset & 2) * 8)) & 0xFFFF) as u16
}

fn pci_write_config_word(bus: u8, device: u8, function: u8, offset: u8, value: u16) {
    let dword_offset = offset & 0xFC;
    let mut dword = pci_read_config_dword(bus, device, function, dword_offset);
    let shift = (offset & 2) * 8;
    let mask = !(0xFFFFu32 << shift);
    dword = (dword & mask) | ((value as u32) << shift);
    pci_write_config_dword(bus, device, function, dword_offset, dword);
}

fn decode_bar(bus: u8, device: u8, function: u8, bar_index: u8) -> (Bar, bool) {
    let offset = 0x10 + bar_index * 4;
    let bar_low = pci_read_config_dword(bus, device, function, offset);

    if bar_low & 0x01 != 0 {
        pci_write_config_dword(bus, device, function, offset, 0xFFFF_FFFF);
        let size_mask = pci_read_config_dword(bus, device, function, offset);
        pci_write_config_dword(bus, device, function, offset, bar_low);
        let address = (bar_low & 0xFFFF_FFFC) as u64;
        let size = if size_mask == 0 || size_mask == 0xFFFF_FFFF {
            0
        } else {
            (!(size_mask & 0xFFFF_FFFC)).wrapping_add(1) as u64
        };
        return (
            Bar {
                address,
                size,
                is_io: true,
                is_64bit: false,
                prefetchable: false,
            },
            false,
        );
    }

    let bar_type = (bar_low >> 1) & 0x03;
    let prefetchable = (bar_low & 0x08) != 0;
    if bar_type == 0x02 {
        let bar_high = pci_read_config_dword(bus, device, function, offset + 4);
        pci_write_config_dword(bus, device, function, offset, 0xFFFF_FFFF);
        pci_write_config_dword(bus, device, function, offset + 4, 0xFFFF_FFFF);
        let size_low = pci_read_config_dword(bus, device, function, offset);
        let size_high = pci_read_config_dword(bus, device, function, offset + 4);
        pci_write_config_dword(bus, device, function, offset, bar_low);
        pci_write_config_dword(bus, device, function, offset + 4, bar_high);
        let address = ((bar_high as u64) << 32) | ((bar_low & 0xFFFF_FFF0) as u64);
        let size_mask = ((size_high as u64) << 32) | ((size_low & 0xFFFF_FFF0) as u64);
        let size = if size_mask == 0 {
            0
        } else {
            (!size_mask).wrapping_add(1)
        };
        (
            Bar {
                address,
                size,
                is_io: false,
                is_64bit: true,
                prefetchable,
            },
            true,
        )
    } else {
        pci_write_config_dword(bus, device, function, offset, 0xFFFF_FFFF);
        let size_mask = pci_read_config_dword(bus, device, function, offset);
        pci_write_config_dword(bus, device, function, offset, bar_low);
        let address = (bar_low & 0xFFFF_FFF0) as u64;
        let size = if size_mask == 0 || size_mask == 0xFFFF_FFFF {
            0
        } else {
            (!(size_mask & 0xFFFF_FFF0)).wrapping_add(1) as u64
        };
        (
            Bar {
                address,
                size,
                is_io: false,
                is_64bit: false,
                prefetchable,
            },
            false,
        )
    }
}

/// Register device (spec §4.9 "Register device"): populate from config
/// space at 0x00, 0x08, 0x0C and decode BARs.
fn register_device(bus: u8, device: u8, function: u8) -> Device {
    let vendor_device = pci_read_config_dword(bus, device, function, 0x00);
    let vendor_id = vendor_device as u16;
    let device_id = (vendor_device >> 16) as u16;

    let class_reg = pci_read_config_dword(bus, device, function, 0x08);
    let revision_id = class_reg as u8;
    let prog_if = (class_reg >> 8) as u8;
    let subclass = (class_reg >> 16) as u8;
    let class = (class_reg >> 24) as u8;

    let header_reg = pci_read_config_dword(bus, device, function, 0x0C);
    let header_type = (header_reg >> 16) as u8;
    let multifunction = header_type & 0x80 != 0;

    let mut bars = [Bar::empty(); 6];
    let mut i = 0u8;
    while i < 6 {
        let (bar, skip_next) = decode_bar(bus, device, function, i);
        bars[i as usize] = bar;
        i += 1;
        if skip_next && i < 6 {
            i += 1;
        }
    }

    Device {
        bus,
        device,
        function,
        vendor_id,
        device_id,
        revision_id,
        class,
        subclass,
        prog_if,
        header_type,
        multifunction,
        bars,
        driver: None,
    }
}

static DEVICES: SpinLock<Vec<Device>> = SpinLock::new(Vec::new());
static DRIVERS: SpinLock<Vec<&'static PciDriver>> = SpinLock::new(Vec::new());

const PCI_BRIDGE_CLASS: u8 = 0x06;
const PCI_BRIDGE_SUBCLASS: u8 = 0x00;

/// Function 0 of a slot can itself be a bridge (spec §4.9 step 4), but
/// recursing into "the bus whose number equals that function" for
/// function 0 would mean bus 0 recursing into bus 0 forever; that case is
/// read as already covered by the current scan, so only functions 1-7
/// (found via the multi-function path) ever trigger a recursive scan.
fn enumerate_bus(bus: u8) {
    for slot in 0..MAX_DEVICE {
        let probe = pci_read_config_dword(bus, slot, 0, 0x00);
        if probe as u16 == 0xFFFF {
            continue;
        }
        let function0 = register_device(bus, slot, 0);
        let multifunction = function0.multifunction;
        DEVICES.lock().push(function0);

        if !multifunction {
            continue;
        }
        for function in 1..8u8 {
            let probe = pci_read_config_dword(bus, slot, function, 0x00);
            if probe as u16 == 0xFFFF {
                continue;
            }
            let dev = register_device(bus, slot, function);
            let is_bridge = dev.class == PCI_BRIDGE_CLASS && dev.subclass == PCI_BRIDGE_SUBCLASS;
            DEVICES.lock().push(dev);
            if is_bridge {
                enumerate_bus(function);
            }
        }
    }
}

/// `pci_enumerate_devices()` (spec §4.9). Reads `(0,0,0)`'s vendor id
/// first; a missing root bus is logged and the scan is skipped entirely
/// rather than walking 32 empty slots.
pub fn enumerate_devices() {
    let root_vendor = pci_read_config_dword(0, 0, 0, 0x00) as u16;
    if root_vendor == 0xFFFF {
        log::warn!("pci: no root bus");
        return;
    }
    DEVICES.lock().clear();
    enumerate_bus(0);
    let count = DEVICES.lock().len();
    log::info!("pci: enumerated {} device(s) on bus 0", count);
    bind_drivers();
}

/// `pci_register_device_driver(drv)` (spec §4.9 "Driver binding").
pub fn register_driver(driver: &'static PciDriver) {
    DRIVERS.lock().push(driver);
    bind_driver(driver);
}

fn bind_driver(driver: &'static PciDriver) {
    let mut devices = DEVICES.lock();
    for dev in devices.iter_mut() {
        if dev.driver.is_none()
            && dev.class == driver.class
            && dev.subclass == driver.subclass
            && (driver.probe)(dev)
        {
            dev.driver = Some(driver.name);
        }
    }
}

fn bind_drivers() {
    let drivers: Vec<&'static PciDriver> = DRIVERS.lock().clone();
    for driver in drivers {
        bind_driver(driver);
    }
}

pub fn devices() -> Vec<Device> {
    DEVICES.lock().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_decode_rejects_all_ones_size_mask() {
        let bar = Bar {
            address: 0,
            size: 0,
            is_io: true,
            is_64bit: false,
            prefetchable: false,
        };
        assert!(!bar.is_valid());
    }
}

//! PS/2 controller bring-up (spec §4.11): the 8-step state machine that
//! disables both devices, self-tests the controller, and identifies
//! whatever is plugged into port 1.
//!
//! Uses the same `PortIo`/`X86Io` primitives `pci.rs`/`ata.rs` use for
//! every other piece of legacy I/O-port hardware.

use crate::arch::traits::PortIo;
use crate::arch::x86::io::X86Io;
use crate::interrupts::timer;

const DATA_PORT: u16 = 0x60;
const STATUS_COMMAND_PORT: u16 = 0x64;

const STATUS_OUTPUT_FULL: u8 = 0x01;
const STATUS_INPUT_FULL: u8 = 0x02;

const MAX_TRY_COUNT: u32 = 5;
const DEVICE_TIMEOUT_MS: u64 = 50;

const ACK: u8 = 0xFA;
const RESEND: u8 = 0xFE;
const SELF_TEST_PASS: u8 = 0x55;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port1Device {
    Unknown,
    Mf2Keyboard,
}

fn status() -> u8 {
    unsafe { X86Io::in_u8(STATUS_COMMAND_PORT) }
}

fn wait_input_clear() -> Result<(), ()> {
    let deadline = timer::millis() + DEVICE_TIMEOUT_MS;
    while status() & STATUS_INPUT_FULL != 0 {
        if timer::millis() > deadline {
            return Err(());
        }
    }
    Ok(())
}

fn wait_output_full() -> Result<(), ()> {
    let deadline = timer::millis() + DEVICE_TIMEOUT_MS;
    while status() & STATUS_OUTPUT_FULL == 0 {
        if timer::millis() > deadline {
            return Err(());
        }
    }
    Ok(())
}

fn write_command(cmd: u8) -> Result<(), ()> {
    wait_input_clear()?;
    unsafe { X86Io::out_u8(STATUS_COMMAND_PORT, cmd) };
    Ok(())
}

fn write_data(byte: u8) -> Result<(), ()> {
    wait_input_clear()?;
    unsafe { X86Io::out_u8(DATA_PORT, byte) };
    Ok(())
}

fn read_data() -> Result<u8, ()> {
    wait_output_full()?;
    Ok(unsafe { X86Io::in_u8(DATA_PORT) })
}

fn flush_output_buffer() {
    while status() & STATUS_OUTPUT_FULL != 0 {
        unsafe {
            X86Io::in_u8(DATA_PORT);
        }
    }
}

/// Send a device command and wait for `0xFA`, resending up to
/// `MAX_TRY_COUNT` times on `0xFE` (spec §4.11 step 7's ack/resend rule,
/// applied generically since step 8's identify request follows the same
/// convention).
fn send_device_command(cmd: u8) -> Result<u8, ()> {
    for _ in 0..MAX_TRY_COUNT {
        write_data(cmd)?;
        match read_data() {
            Ok(RESEND) => continue,
            Ok(byte) => return Ok(byte),
            Err(()) => return Err(()),
        }
    }
    Err(())
}

fn retry<F: Fn() -> Result<bool, ()>>(step: F) -> Result<(), ()> {
    for _ in 0..MAX_TRY_COUNT {
        if step()? {
            return Ok(());
        }
    }
    Err(())
}

/// Runs the full 8-step bring-up. Logs and returns without panicking on
/// any step failure — PS/2 hardware is optional (USB-only machines have
/// none), matching `NoDevice`-class failures elsewhere in the driver
/// substrate.
pub fn init() -> Option<Port1Device> {
    // Step 1: disable both devices, flush stale output.
    write_command(0xAD).ok()?;
    write_command(0xA7).ok()?;
    flush_output_buffer();

    // Step 2: read config byte, capture dual-channel bit, clear IRQ-enable
    // and translation bits.
    write_command(0x20).ok()?;
    let config = read_data().ok()?;
    // Bit 5 (second PS/2 port present) is captured per spec step 2 but
    // this state machine only brings up port 1 — dual-channel keyboard
    // controllers with a mouse on port 2 are out of scope here.
    let _dual_channel = config & (1 << 5) != 0;
    let new_config = config & !0b0100_0011;
    write_command(0x60).ok()?;
    write_data(new_config).ok()?;

    // Step 3: controller self-test.
    let self_test_ok = retry(|| {
        write_command(0xAA).map_err(|_| ())?;
        Ok(read_data().map_err(|_| ())? == SELF_TEST_PASS)
    });
    if self_test_ok.is_err() {
        log::warn!("ps2: controller self-test failed");
        return None;
    }

    // Step 4: some controllers reset config on self-test.
    write_command(0x60).ok()?;
    write_data(new_config).ok()?;

    // Step 5: port-1 interface test.
    let port_test_ok = retry(|| {
        write_command(0xAB).map_err(|_| ())?;
        Ok(read_data().map_err(|_| ())? == 0)
    });
    if port_test_ok.is_err() {
        log::warn!("ps2: port 1 interface test failed");
        return None;
    }

    // Step 6: enable port 1, disable scanning so identify bytes aren't
    // mixed with keystrokes.
    write_command(0xAE).ok()?;
    if send_device_command(0xF5) != Ok(ACK) {
        log::warn!("ps2: port 1 device did not ack disable-scanning");
        return None;
    }

    // Step 7: reset device, expect ack then self-test-pass.
    match send_device_command(0xFF) {
        Ok(ACK) => match read_data() {
            Ok(0xAA) => {}
            _ => {
                log::warn!("ps2: port 1 device reset did not complete");
                return None;
            }
        },
        _ => {
            log::warn!("ps2: port 1 device did not ack reset");
            return None;
        }
    }

    // Step 8: identify. Up to two non-duplicate response bytes.
    if send_device_command(0xF2) != Ok(ACK) {
        log::warn!("ps2: port 1 device did not ack identify");
        return None;
    }
    let first = read_data().ok();
    let second = read_data().ok();

    let kind = match (first, second) {
        (Some(0xAB), Some(0x83)) | (Some(0xAB), Some(0xC1)) => Port1Device::Mf2Keyboard,
        _ => Port1Device::Unknown,
    };
    log::info!("ps2: port 1 device identified as {:?}", kind);
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_bytes_match_mf2_keyboard() {
        let classify = |first: Option<u8>, second: Option<u8>| match (first, second) {
            (Some(0xAB), Some(0x83)) | (Some(0xAB), Some(0xC1)) => Port1Device::Mf2Keyboard,
            _ => Port1Device::Unknown,
        };
        assert_eq!(classify(Some(0xAB), Some(0x83)), Port1Device::Mf2Keyboard);
        assert_eq!(classify(Some(0xAB), Some(0xC1)), Port1Device::Mf2Keyboard);
        assert_eq!(classify(Some(0x00), Some(0x00)), Port1Device::Unknown);
    }
}

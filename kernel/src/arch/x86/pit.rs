//! 8253/8254 PIT channel 0 programming (spec §2 item 8's "timer tick").
//!
//! Not itself spec-named (the spec only asks for "a timer-tick hook
//! invoked from the PIT/RTC IRQ handler"): the arch layer owns this piece
//! of legacy ISA hardware programming over raw port I/O, same as it owns
//! the PIC, the other half of the same 8253 family.

use super::io::X86Io;
use crate::arch::traits::PortIo;

const CHANNEL0_DATA: u16 = 0x40;
const MODE_COMMAND: u16 = 0x43;

/// Base oscillator frequency the 8253/8254 divides down from.
const PIT_BASE_HZ: u32 = 1_193_182;

// Channel 0, lobyte/hibyte access, mode 2 (rate generator), binary mode.
const COMMAND_CHANNEL0_RATE_GENERATOR: u8 = 0b0011_0100;

/// Program channel 0 to fire IRQ0 at `hz`, clamped to the divisor's 16-bit
/// range (a divisor of 0 is treated by hardware as 65536).
pub fn set_frequency(hz: u32) {
    let divisor = (PIT_BASE_HZ / hz).clamp(1, 65535) as u16;
    unsafe {
        X86Io::out_u8(MODE_COMMAND, COMMAND_CHANNEL0_RATE_GENERATOR);
        X86Io::out_u8(CHANNEL0_DATA, (divisor & 0xFF) as u8);
        X86Io::out_u8(CHANNEL0_DATA, (divisor >> 8) as u8);
    }
}

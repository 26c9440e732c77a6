//! Serial (16550 UART) sink. The `uart_16550` crate's `SerialPort` type is
//! gated to x86_64 targets internally, so this is a hand-rolled
//! equivalent over `x86::io`, in the same init/write_byte shape.

use super::{Color, KOutputSink};
use crate::arch::traits::PortIo;
use crate::arch::x86::X86Io;

const COM1: u16 = 0x3F8;

const REG_DATA: u16 = 0;
const REG_INT_ENABLE: u16 = 1;
const REG_FIFO_CTRL: u16 = 2;
const REG_LINE_CTRL: u16 = 3;
const REG_MODEM_CTRL: u16 = 4;
const REG_LINE_STATUS: u16 = 5;

const LINE_STATUS_THR_EMPTY: u8 = 1 << 5;

pub struct SerialSink {
    base: u16,
}

impl SerialSink {
    /// Program the UART for 38400 baud, 8N1, FIFO enabled.
    ///
    /// # Safety
    /// Must run once, before any other port I/O to `base` occurs.
    pub unsafe fn init(base: u16) -> Self {
        X86Io::out_u8(base + REG_INT_ENABLE, 0x00); // disable interrupts
        X86Io::out_u8(base + REG_LINE_CTRL, 0x80); // enable DLAB
        X86Io::out_u8(base + REG_DATA, 0x03); // divisor low: 38400 baud
        X86Io::out_u8(base + REG_INT_ENABLE, 0x00); // divisor high
        X86Io::out_u8(base + REG_LINE_CTRL, 0x03); // 8 bits, no parity, 1 stop
        X86Io::out_u8(base + REG_FIFO_CTRL, 0xC7); // enable FIFO, clear, 14-byte threshold
        X86Io::out_u8(base + REG_MODEM_CTRL, 0x0B); // RTS/DSR set
        SerialSink { base }
    }

    fn transmit_empty(&self) -> bool {
        unsafe { X86Io::in_u8(self.base + REG_LINE_STATUS) & LINE_STATUS_THR_EMPTY != 0 }
    }

    fn write_byte(&mut self, byte: u8) {
        while !self.transmit_empty() {
            core::hint::spin_loop();
        }
        unsafe { X86Io::out_u8(self.base, byte) };
    }
}

impl KOutputSink for SerialSink {
    fn name(&self) -> &str {
        "serial"
    }

    fn output_char(&mut self, c: u8, _fg: Color, _bg: Color) {
        self.write_byte(c);
    }

    fn newline(&mut self) {
        self.write_byte(b'\r');
        self.write_byte(b'\n');
    }
}

pub fn com1() -> SerialSink {
    unsafe { SerialSink::init(COM1) }
}

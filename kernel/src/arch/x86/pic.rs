//! 8259 PIC programming (spec §4.5). Hand-rolled over raw port I/O — see
//! DESIGN.md for why this spec doesn't use the `pic8259` crate (it only
//! targets x86_64): this does what `ChainedPics` does, directly over raw
//! port I/O.

use super::io::X86Io;
use crate::arch::traits::{InterruptController, PortIo};
use crate::spinlock::SpinLock;

const MASTER_CMD: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_CMD: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;

const OCW3_READ_ISR: u8 = 0x0B;
const PIC_EOI: u8 = 0x20;

pub const PIC1_OFFSET: u8 = 32;
pub const PIC2_OFFSET: u8 = PIC1_OFFSET + 8;

struct PicState {
    mask1: u8,
    mask2: u8,
}

static STATE: SpinLock<PicState> = SpinLock::new(PicState {
    mask1: 0xFF,
    mask2: 0xFF,
});

pub struct X86Pic;

impl X86Pic {
    /// Remap the master/slave PIC to vectors 32-47 (spec §3, §4.5).
    ///
    /// Preserves the caller's IRQ masks across the remap, per §4.5.
    pub fn remap() {
        unsafe {
            let saved_mask1 = X86Io::in_u8(MASTER_DATA);
            let saved_mask2 = X86Io::in_u8(SLAVE_DATA);

            // ICW1: begin initialization, ICW4 will be sent.
            X86Io::out_u8(MASTER_CMD, ICW1_INIT | ICW1_ICW4);
            super::io::io_wait();
            X86Io::out_u8(SLAVE_CMD, ICW1_INIT | ICW1_ICW4);
            super::io::io_wait();

            // ICW2: vector offsets.
            X86Io::out_u8(MASTER_DATA, PIC1_OFFSET);
            super::io::io_wait();
            X86Io::out_u8(SLAVE_DATA, PIC2_OFFSET);
            super::io::io_wait();

            // ICW3: master has a slave on IRQ2 (bit 2); slave's cascade
            // identity is 2.
            X86Io::out_u8(MASTER_DATA, 1 << 2);
            super::io::io_wait();
            X86Io::out_u8(SLAVE_DATA, 2);
            super::io::io_wait();

            // ICW4: 8086/88 mode.
            X86Io::out_u8(MASTER_DATA, ICW4_8086);
            super::io::io_wait();
            X86Io::out_u8(SLAVE_DATA, ICW4_8086);
            super::io::io_wait();

            X86Io::out_u8(MASTER_DATA, saved_mask1);
            X86Io::out_u8(SLAVE_DATA, saved_mask2);

            let mut state = STATE.lock();
            state.mask1 = saved_mask1;
            state.mask2 = saved_mask2;
        }
    }

    fn write_masks(mask1: u8, mask2: u8) {
        unsafe {
            X86Io::out_u8(MASTER_DATA, mask1);
            X86Io::out_u8(SLAVE_DATA, mask2);
        }
        let mut state = STATE.lock();
        state.mask1 = mask1;
        state.mask2 = mask2;
    }
}

impl InterruptController for X86Pic {
    fn init() {
        Self::remap();
    }

    fn enable_irq(irq: u8) {
        let (mut m1, mut m2) = {
            let state = STATE.lock();
            (state.mask1, state.mask2)
        };
        if irq < 8 {
            m1 &= !(1 << irq);
        } else {
            m2 &= !(1 << (irq - 8));
        }
        Self::write_masks(m1, m2);
    }

    fn disable_irq(irq: u8) {
        let (mut m1, mut m2) = {
            let state = STATE.lock();
            (state.mask1, state.mask2)
        };
        if irq < 8 {
            m1 |= 1 << irq;
        } else {
            m2 |= 1 << (irq - 8);
        }
        Self::write_masks(m1, m2);
    }

    fn send_eoi(vector: u8) {
        unsafe {
            if vector >= PIC2_OFFSET {
                X86Io::out_u8(SLAVE_CMD, PIC_EOI);
            }
            X86Io::out_u8(MASTER_CMD, PIC_EOI);
        }
    }

    /// Read the in-service register of both PICs via OCW3 (spec §4.5
    /// spurious-IRQ filter).
    fn read_isr() -> (u8, u8) {
        unsafe {
            X86Io::out_u8(MASTER_CMD, OCW3_READ_ISR);
            X86Io::out_u8(SLAVE_CMD, OCW3_READ_ISR);
            (X86Io::in_u8(MASTER_CMD), X86Io::in_u8(SLAVE_CMD))
        }
    }
}

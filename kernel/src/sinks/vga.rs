//! VGA text-mode sink: the 80x25 character buffer at physical `0xB8000`
//! (spec §4.12). The plain VGA text buffer this target boots with,
//! before any linear-framebuffer mode is set up.

use super::{Color, KOutputSink};

const WIDTH: usize = 80;
const HEIGHT: usize = 25;
const VGA_BUFFER: usize = 0xB8000;

#[repr(transparent)]
struct ScreenChar(u16);

impl ScreenChar {
    fn new(ascii: u8, fg: Color, bg: Color) -> Self {
        let attr = (bg.0 << 4 & 0xF0) | (fg.0 & 0x0F);
        ScreenChar((attr as u16) << 8 | ascii as u16)
    }
}

pub struct VgaTextSink {
    col: usize,
    row: usize,
}

impl VgaTextSink {
    pub const fn new() -> Self {
        VgaTextSink { col: 0, row: 0 }
    }

    fn buffer(&mut self) -> *mut u16 {
        VGA_BUFFER as *mut u16
    }

    fn scroll(&mut self) {
        let buf = self.buffer();
        unsafe {
            for row in 1..HEIGHT {
                for col in 0..WIDTH {
                    let value = buf.add(row * WIDTH + col).read_volatile();
                    buf.add((row - 1) * WIDTH + col).write_volatile(value);
                }
            }
            let blank = ScreenChar::new(b' ', Color::WHITE, Color::BLACK).0;
            for col in 0..WIDTH {
                buf.add((HEIGHT - 1) * WIDTH + col).write_volatile(blank);
            }
        }
        self.row = HEIGHT - 1;
    }
}

impl KOutputSink for VgaTextSink {
    fn name(&self) -> &str {
        "vga"
    }

    fn output_char(&mut self, c: u8, fg: Color, bg: Color) {
        if self.col >= WIDTH {
            self.newline();
        }
        let buf = self.buffer();
        unsafe {
            buf.add(self.row * WIDTH + self.col)
                .write_volatile(ScreenChar::new(c, fg, bg).0);
        }
        self.col += 1;
    }

    fn newline(&mut self) {
        self.col = 0;
        if self.row + 1 >= HEIGHT {
            self.scroll();
        } else {
            self.row += 1;
        }
    }
}

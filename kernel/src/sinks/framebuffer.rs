//! Framebuffer + PSF sink (spec §4.12). Only the sink *contract* is in
//! scope — glyph blitting and PSF font parsing are explicitly excluded
//! (spec §1). This stub holds the geometry a real renderer would need and
//! satisfies `KOutputSink` with a no-op body, so the multiplexer's shape
//! is complete even though no linear-framebuffer mode is set up by the
//! in-scope boot path.

use super::{Color, KOutputSink};

pub struct FramebufferSink {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl FramebufferSink {
    pub const fn new(width: u32, height: u32, stride: u32) -> Self {
        FramebufferSink {
            width,
            height,
            stride,
        }
    }
}

impl KOutputSink for FramebufferSink {
    fn name(&self) -> &str {
        "framebuffer"
    }

    fn output_char(&mut self, _c: u8, _fg: Color, _bg: Color) {
        // Glyph bit-blitting is out of scope; this sink exists to satisfy
        // the contract for a future PSF-backed renderer.
    }

    fn newline(&mut self) {}
}

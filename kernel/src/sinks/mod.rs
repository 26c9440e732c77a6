//! Output sink multiplexer (spec §4.12).
//!
//! A list of registered `KOutputSink` implementations; writes fan out to
//! every registered sink — a registry any sink can join, rather than two
//! hardcoded global writers, since the spec names the registry itself
//! (not just VGA/serial) as the contract.

pub mod serial;
pub mod vga;
pub mod framebuffer;

use crate::spinlock::SpinLock;
use core::fmt;

/// Foreground/background color, meaningful only to sinks that render text
/// in color (VGA); sinks without a notion of color ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub u8);

impl Color {
    pub const WHITE: Color = Color(0x0F);
    pub const BLACK: Color = Color(0x00);
    pub const RED: Color = Color(0x0C);
}

/// One registered output device. `output_char` and `newline` are the only
/// operations the multiplexer needs; everything sink-specific (palette,
/// cursor, glyph blitting) stays behind this trait.
pub trait KOutputSink: Send {
    fn name(&self) -> &str;
    fn output_char(&mut self, c: u8, fg: Color, bg: Color);
    fn newline(&mut self);
}

const MAX_SINKS: usize = 4;

struct Registry {
    sinks: [Option<alloc::boxed::Box<dyn KOutputSink>>; MAX_SINKS],
    count: usize,
}

static REGISTRY: SpinLock<Registry> = SpinLock::new(Registry {
    sinks: [None, None, None, None],
    count: 0,
});

/// `kstdio_register_sink` (spec §4.12): append a sink, in registration
/// order, up to `MAX_SINKS`. Sinks never fail to initialize in this
/// implementation (no sink here owns external hardware state that probes
/// can fail against), so there is no init-failure path to propagate.
pub fn register_sink(sink: alloc::boxed::Box<dyn KOutputSink>) {
    let mut reg = REGISTRY.lock();
    if reg.count >= MAX_SINKS {
        return;
    }
    let idx = reg.count;
    reg.sinks[idx] = Some(sink);
    reg.count += 1;
}

fn write_str_to_all(s: &str) {
    let mut reg = REGISTRY.lock();
    for slot in reg.sinks[..reg.count].iter_mut() {
        if let Some(sink) = slot {
            for byte in s.bytes() {
                if byte == b'\n' {
                    sink.newline();
                } else {
                    sink.output_char(byte, Color::WHITE, Color::BLACK);
                }
            }
        }
    }
}

struct SinkWriter;

impl fmt::Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_str_to_all(s);
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    let _ = SinkWriter.write_fmt(args);
}

//! Kernel logging: the `log` crate façade on top of the sink multiplexer
//! (§4.12, §1 ambient stack).
//!
//! Buffers log records until sinks exist, then fans out through whatever
//! sinks are registered — the multiplexer owns the set of concrete
//! outputs, so the logger itself never needs to know about VGA/serial
//! individually.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

const BUFFER_SIZE: usize = 8192;

struct LogBuffer {
    bytes: [u8; BUFFER_SIZE],
    len: usize,
}

impl LogBuffer {
    const fn new() -> Self {
        LogBuffer {
            bytes: [0; BUFFER_SIZE],
            len: 0,
        }
    }

    fn contents(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("<invalid utf8>")
    }
}

impl Write for LogBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = BUFFER_SIZE - self.len;
        if bytes.len() > remaining {
            return Ok(());
        }
        self.bytes[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

pub struct KernelLogger {
    buffer: Mutex<LogBuffer>,
    sinks_ready: AtomicBool,
}

impl KernelLogger {
    const fn new() -> Self {
        KernelLogger {
            buffer: Mutex::new(LogBuffer::new()),
            sinks_ready: AtomicBool::new(false),
        }
    }

    /// Called once the output-sink multiplexer has at least one sink
    /// registered (spec §4.12); flushes anything buffered during early
    /// boot and switches to direct output from then on.
    pub fn sinks_ready(&self) {
        let buffer = self.buffer.lock();
        if buffer.len > 0 {
            crate::kprintln!("=== buffered boot log ===");
            crate::kprintln!("{}", buffer.contents());
            crate::kprintln!("=== end buffered log ===");
        }
        self.sinks_ready.store(true, Ordering::SeqCst);
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if self.sinks_ready.load(Ordering::SeqCst) {
            crate::kprintln!(
                "[{:>5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        } else if let Some(mut buffer) = self.buffer.try_lock() {
            let _ = writeln!(
                buffer,
                "[{:>5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger::new();

/// Install the logger as the global `log` facade target. Safe to call
/// before any sink is registered; messages buffer until `sinks_ready`.
pub fn init_early() {
    log::set_logger(&LOGGER).expect("logger already set");
    log::set_max_level(LevelFilter::Trace);
}

pub fn sinks_ready() {
    LOGGER.sinks_ready();
}

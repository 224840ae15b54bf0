#![no_std]

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Once;

/// Where formatted log records end up. The embedder registers exactly one
/// sink (a console writer, a serial port, a test capture buffer); records
/// logged before registration are dropped.
pub trait LogSink: Send + Sync {
    fn write(&self, record: &Record);
}

static SINK: Once<&'static dyn LogSink> = Once::new();

struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            sink.write(record);
        }
    }

    fn flush(&self) {}
}

/// Registers the process-wide sink. Later calls are ignored.
pub fn register_sink(sink: &'static dyn LogSink) {
    SINK.call_once(|| sink);
}

/// Installs the logger and picks the level from the `LOG` environment
/// variable at compile time.
pub fn init() {
    static LOGGER: SimpleLogger = SimpleLogger;
    log::set_logger(&LOGGER).ok();
    log::set_max_level(match option_env!("LOG") {
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("info") => LevelFilter::Info,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        _ => LevelFilter::Off,
    });
}

/// ANSI color code for a level, for sinks that render to a terminal.
pub fn level2color(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 36,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

//! Logging infrastructure
//!
//! This module provides logging via the `log` crate, writing timestamped
//! lines to a board-provided sink (typically a UART or an RTT channel).
//!
//! Each record is formatted into a fixed-size line buffer before it reaches
//! the sink, so a sink only ever sees whole lines. Records that arrive
//! while another context is in the middle of logging (an interrupt that
//! preempted the task) are dropped instead of deadlocking.

use crate::time::Clock;
use core::fmt::Write;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Maximum length of one formatted log line
const LINE_CAPACITY: usize = 160;

/// Destination for formatted log lines
pub trait LogSink: Sync {
    /// Write one complete line (without trailing newline)
    fn write_line(&self, line: &str);
}

struct Outputs {
    sink: &'static dyn LogSink,
    clock: &'static (dyn Clock + Sync),
}

/// Sink logger with millisecond timestamps
struct SinkLogger {
    outputs: Mutex<Option<Outputs>>,
}

impl log::Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let Some(guard) = self.outputs.try_lock() else {
            return;
        };
        let Some(outputs) = guard.as_ref() else {
            return;
        };

        let level_str = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };

        let mut line: heapless::String<LINE_CAPACITY> = heapless::String::new();
        // Overlong lines are truncated at the buffer capacity
        let _ = write!(
            line,
            "[{:>10}] [{}] {}",
            outputs.clock.now_ms(),
            level_str,
            record.args()
        );
        outputs.sink.write_line(&line);
    }

    fn flush(&self) {}
}

static LOGGER: SinkLogger = SinkLogger {
    outputs: Mutex::new(None),
};

/// Initialize the logging subsystem
///
/// Fails if another logger was already installed for the program.
pub fn init(
    sink: &'static dyn LogSink,
    clock: &'static (dyn Clock + Sync),
    level: LevelFilter,
) -> Result<(), SetLoggerError> {
    *LOGGER.outputs.lock() = Some(Outputs { sink, clock });

    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

/// Set the maximum log level
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

//! Leveled logging for command line programs and containers.
//!
//! A [`Logger`] routes each message to a console sink and optional human and
//! JSON file sinks. On an interactive terminal it also keeps a live region at
//! the bottom of the screen with a resource monitor line, one bar per active
//! [`ProgressTracker`] and the latest status message.

pub mod config;
mod events;
pub mod live;
pub mod logging;
pub mod monitor;
pub mod progress;
pub mod utils;

use std::sync::OnceLock;

pub use config::{Config, Environment, Options, ProcessEnvironment};
pub use logging::{
    Builder, Channel, LogLevel, LogSink, Logger, MessageOptions, Record, RunMode, SinkError,
};
pub use monitor::{Monitor, MonitorState, ResourceSample};
pub use progress::{ProgressOptions, ProgressSnapshot, ProgressTracker};

static SHARED: OnceLock<Logger> = OnceLock::new();

/// The process-wide logger, built from the environment on first use and
/// kept until the process exits.
pub fn shared() -> &'static Logger {
    SHARED.get_or_init(|| Builder::new().build())
}

/// Logs through a logger built for this call only, so file sinks are opened
/// and closed every time. Use [`shared`] for repeated calls.
pub fn log(level: LogLevel, message: impl AsRef<str>, options: &MessageOptions) {
    Builder::new().build().log(level, message, options);
}

pub fn error(message: impl AsRef<str>) {
    log(LogLevel::Error, message, &MessageOptions::default());
}

pub fn warn(message: impl AsRef<str>) {
    log(LogLevel::Warn, message, &MessageOptions::default());
}

pub fn info(message: impl AsRef<str>) {
    log(LogLevel::Info, message, &MessageOptions::default());
}

pub fn verbose(message: impl AsRef<str>) {
    log(LogLevel::Verbose, message, &MessageOptions::default());
}

pub fn debug(message: impl AsRef<str>) {
    log(LogLevel::Debug, message, &MessageOptions::default());
}

pub fn status(message: impl AsRef<str>, options: &MessageOptions) {
    log(LogLevel::Status, message, options);
}

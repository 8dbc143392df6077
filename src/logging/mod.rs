mod formatters;
mod level;
mod logger;
mod router;
mod sinks;

use serde_json::Value;

pub use formatters::{ConsoleFormatter, ContainerFormatter, HumanFormatter, JsonFormatter};
pub use level::LogLevel;
pub use logger::{Builder, Logger, SinkError};
pub use router::{Channel, OutputChannel, ResolvedChannels, RunMode, Router};
pub use sinks::{ConsoleSink, FileSink, LeveledSink, NullSink};

/// A single message as handed to a sink.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub level: LogLevel,
    pub message: &'a str,
    pub data: Option<&'a Value>,
    pub meta: Option<&'a Value>,
}

pub trait LogFormatter: Sync + Send {
    fn format(&self, record: &Record) -> String;
}

pub trait LogSink: Sync + Send {
    fn write_log(&self, record: &Record) -> eyre::Result<()>;
    fn flush(&self);
}

/// Per-call options for a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageOptions {
    /// Replaces the message on the durable sinks, and on the console in
    /// container mode.
    pub logging_message: Option<String>,
    /// Structured payload, handed to the sinks verbatim.
    pub data: Option<Value>,
    /// Diagnostic context for the file and JSON sinks.
    pub meta: Option<Value>,
    /// `None` uses the configured channels; `Some(vec![])` writes nowhere.
    pub channels: Option<Vec<Channel>>,
}

impl MessageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self::new().channels(channels)
    }

    pub fn channels(self, channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: Some(channels.into_iter().collect()),
            ..self
        }
    }

    pub fn data(self, data: Value) -> Self {
        Self {
            data: Some(data),
            ..self
        }
    }

    pub fn meta(self, meta: Value) -> Self {
        Self {
            meta: Some(meta),
            ..self
        }
    }

    pub fn logging_message(self, message: impl Into<String>) -> Self {
        Self {
            logging_message: Some(message.into()),
            ..self
        }
    }

    /// Whether these options leave the terminal in play: no filter at all,
    /// or a filter naming `console` or `stdout`.
    pub fn reaches_terminal(&self) -> bool {
        match &self.channels {
            None => true,
            Some(channels) => channels.iter().any(|c| c.targets_terminal()),
        }
    }
}

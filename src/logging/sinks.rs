use std::{
    fs::File,
    io::{LineWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use eyre::Context;

use crate::live::SharedTerminal;

use super::{LogFormatter, LogLevel, LogSink, OutputChannel, Record};

pub struct FileSink {
    file: Mutex<LineWriter<File>>,
    file_path: PathBuf,
    formatter: Box<dyn LogFormatter>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>, formatter: Box<dyn LogFormatter>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed opening or creating log file {}", path.display()))?;

        Ok(Self {
            file: Mutex::new(LineWriter::new(file)),
            file_path: path.to_path_buf(),
            formatter,
        })
    }
}

impl LogSink for FileSink {
    fn write_log(&self, record: &Record) -> eyre::Result<()> {
        let line = self.formatter.format(record);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{}", line)
            .with_context(|| format!("Can't write to {}", self.file_path.display()))?;
        file.flush().context("Can't flush file")
    }

    fn flush(&self) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = file.flush() {
            tracing::debug!(target: "sherlog", "flushing {} failed: {}", self.file_path.display(), err);
        }
    }
}

/// Writes formatted records through the terminal shared with the live
/// region, so both stay in one stream.
pub struct ConsoleSink {
    terminal: SharedTerminal,
    formatter: Box<dyn LogFormatter>,
}

impl ConsoleSink {
    pub fn new(terminal: SharedTerminal, formatter: Box<dyn LogFormatter>) -> Self {
        Self {
            terminal,
            formatter,
        }
    }
}

impl LogSink for ConsoleSink {
    fn write_log(&self, record: &Record) -> eyre::Result<()> {
        let formatted = self.formatter.format(record);
        self.terminal.with(|writer| {
            for line in formatted.split('\n') {
                writer.write_line(line)?;
            }
            writer.flush()
        })
    }

    fn flush(&self) {
        if let Err(err) = self.terminal.with(|writer| writer.flush()) {
            tracing::debug!(target: "sherlog", "flushing the console failed: {}", err);
        }
    }
}

pub struct NullSink {}

impl NullSink {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for NullSink {
    fn write_log(&self, _record: &Record) -> eyre::Result<()> {
        Ok(())
    }

    fn flush(&self) {}
}

/// A sink bound to an output channel with its own, adjustable threshold.
pub struct LeveledSink {
    channel: OutputChannel,
    name: String,
    sink: Box<dyn LogSink>,
    threshold: Mutex<LogLevel>,
}

impl LeveledSink {
    pub fn new(
        channel: OutputChannel,
        name: impl Into<String>,
        sink: Box<dyn LogSink>,
        threshold: LogLevel,
    ) -> Self {
        Self {
            channel,
            name: name.into(),
            sink,
            threshold: Mutex::new(threshold),
        }
    }

    pub fn channel(&self) -> OutputChannel {
        self.channel
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> LogLevel {
        *self.threshold.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_threshold(&self, level: LogLevel) {
        *self.threshold.lock().unwrap_or_else(PoisonError::into_inner) = level;
    }

    pub fn accepts(&self, level: LogLevel) -> bool {
        self.threshold().admits(level)
    }

    pub fn write_log(&self, record: &Record) -> eyre::Result<()> {
        self.sink
            .write_log(record)
            .with_context(|| format!("{} sink ({}) failed", self.name, self.channel))
    }

    pub fn flush(&self) {
        self.sink.flush()
    }
}

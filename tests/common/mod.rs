#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use serde_json::Value;
use sherlog::{
    config::RemoteOptions, live::TerminalWriter, Builder, LogLevel, LogSink, Options, Record,
    RunMode,
};

/// A terminal that keeps the visible lines, dropping the erased ones.
#[derive(Clone, Default)]
pub struct Screen {
    lines: Arc<Mutex<Vec<String>>>,
    writes: Arc<Mutex<usize>>,
}

impl Screen {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl TerminalWriter for Screen {
    fn write_line(&mut self, line: &str) -> eyre::Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }

    fn erase_lines(&mut self, count: usize) -> eyre::Result<()> {
        let mut lines = self.lines.lock().unwrap();
        let keep = lines.len().saturating_sub(count);
        lines.truncate(keep);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub level: LogLevel,
    pub message: String,
    pub data: Option<Value>,
    pub meta: Option<Value>,
}

/// Keeps every record it is handed. With `failing` set it rejects them all.
#[derive(Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<Entry>>>,
    failing: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }
}

impl LogSink for RecordingSink {
    fn write_log(&self, record: &Record) -> eyre::Result<()> {
        if self.failing {
            eyre::bail!("collector unreachable");
        }

        self.entries.lock().unwrap().push(Entry {
            level: record.level,
            message: record.message.to_string(),
            data: record.data.cloned(),
            meta: record.meta.cloned(),
        });
        Ok(())
    }

    fn flush(&self) {}
}

/// Options that make a remote collector count as configured.
pub fn remote_options(level: LogLevel) -> Options {
    Options {
        level: Some(level),
        remote: RemoteOptions {
            key_file: Some(PathBuf::from("/tmp/key.json")),
            project_id: Some("acme".to_string()),
            level: None,
        },
        ..Options::default()
    }
}

/// A builder isolated from the process environment and the real stdout.
pub fn builder(run_mode: RunMode, screen: &Screen, options: Options) -> Builder {
    Builder::new()
        .with_environment(HashMap::<String, String>::new())
        .with_options(options)
        .with_run_mode(run_mode)
        .with_terminal(screen.clone())
        .with_ansi(false)
}

use std::{
    io::{Stdout, Write},
    sync::{Arc, Mutex, PoisonError},
};

use eyre::Context;

/// Line-oriented access to the terminal that hosts the live region.
pub trait TerminalWriter: Send {
    fn write_line(&mut self, text: &str) -> eyre::Result<()>;

    /// Erases the last `count` lines in place and leaves the cursor at the
    /// start of the first erased line.
    fn erase_lines(&mut self, count: usize) -> eyre::Result<()>;

    fn flush(&mut self) -> eyre::Result<()> {
        Ok(())
    }
}

/// Writes plain lines and erases with cursor-up / erase-line sequences.
pub struct AnsiTerminal<W: Write + Send> {
    out: W,
}

impl AnsiTerminal<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> AnsiTerminal<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TerminalWriter for AnsiTerminal<W> {
    fn write_line(&mut self, text: &str) -> eyre::Result<()> {
        writeln!(self.out, "{}", text).context("Can't write to terminal")
    }

    fn erase_lines(&mut self, count: usize) -> eyre::Result<()> {
        if count == 0 {
            return Ok(());
        }

        let sequence = "\x1b[1A\x1b[2K".repeat(count);
        write!(self.out, "{}\r", sequence).context("Can't erase terminal lines")
    }

    fn flush(&mut self) -> eyre::Result<()> {
        self.out.flush().context("Can't flush terminal")
    }
}

/// A terminal writer shared by the console sink and the compositor.
#[derive(Clone)]
pub struct SharedTerminal(Arc<Mutex<Box<dyn TerminalWriter>>>);

impl SharedTerminal {
    pub fn new(writer: impl TerminalWriter + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    pub fn stdout() -> Self {
        Self::new(AnsiTerminal::stdout())
    }

    pub fn with<T>(
        &self,
        f: impl FnOnce(&mut dyn TerminalWriter) -> eyre::Result<T>,
    ) -> eyre::Result<T> {
        // A panic inside `f` leaves the writer usable, only mid-line.
        let mut writer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(writer.as_mut())
    }
}

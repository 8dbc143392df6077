use yansi::Paint;

use super::SharedTerminal;

/// What a render call does with the retained status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusText {
    /// Redraw with whatever status was retained last.
    Retain,
    /// Replace the retained status.
    Set(String),
    /// Erase the region and forget the retained status.
    Clear,
}

/// Owns the redrawable block at the bottom of an interactive terminal.
///
/// Callers serialize access (the logger keeps it behind a mutex) so an
/// erase and the following draw are never interleaved with another render.
pub struct Compositor {
    terminal: SharedTerminal,
    use_ansi: bool,
    drawn: usize,
    retained: Option<String>,
    last_block: Vec<String>,
}

impl Compositor {
    pub fn new(terminal: SharedTerminal, use_ansi: bool) -> Self {
        Self {
            terminal,
            use_ansi,
            drawn: 0,
            retained: None,
            last_block: Vec::new(),
        }
    }

    /// Number of lines currently on screen.
    pub fn drawn_lines(&self) -> usize {
        self.drawn
    }

    pub fn retained_status(&self) -> Option<&str> {
        self.retained.as_deref()
    }

    /// The block written by the last successful draw.
    pub fn last_block(&self) -> &[String] {
        &self.last_block
    }

    /// Erases the drawn block in place. The retained status survives so the
    /// next render brings it back.
    pub fn erase(&mut self) {
        if self.drawn == 0 {
            return;
        }

        let count = self.drawn;
        self.drawn = 0;
        if let Err(err) = self.terminal.with(|writer| {
            writer.erase_lines(count)?;
            writer.flush()
        }) {
            tracing::debug!(target: "sherlog", "erasing the live region failed: {:#}", err);
        }
    }

    /// Erases the previous block and draws `sections` followed by the
    /// retained status.
    pub fn render(&mut self, sections: Vec<String>, status: StatusText) {
        match status {
            StatusText::Clear => {
                self.erase();
                self.retained = None;
                self.last_block.clear();
                return;
            }
            StatusText::Set(message) => self.retained = Some(message),
            StatusText::Retain => {}
        }

        let mut lines: Vec<String> = sections
            .iter()
            .flat_map(|section| section.split('\n'))
            .map(str::to_string)
            .collect();

        if let Some(status) = &self.retained {
            lines.extend(status.split('\n').map(|line| self.paint_status(line)));
        }

        self.erase();
        self.draw(lines);
    }

    fn draw(&mut self, lines: Vec<String>) {
        let mut written = 0;
        let result = self.terminal.with(|writer| {
            for line in &lines {
                writer.write_line(line)?;
                written += 1;
            }
            writer.flush()
        });

        self.drawn = written;
        match result {
            Ok(()) => self.last_block = lines,
            Err(err) => {
                tracing::debug!(target: "sherlog", "drawing the live region failed: {:#}", err);
                self.last_block = lines.into_iter().take(written).collect();
            }
        }
    }

    fn paint_status(&self, line: &str) -> String {
        if self.use_ansi {
            line.red().to_string()
        } else {
            line.to_string()
        }
    }
}

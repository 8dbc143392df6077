mod compositor;
mod terminal;

pub use compositor::{Compositor, StatusText};
pub use terminal::{AnsiTerminal, SharedTerminal, TerminalWriter};

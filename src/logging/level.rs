use std::{fmt, str::FromStr};

/// Severity of a message. Lower ranks are more severe; a sink accepts a
/// message when `message.rank() <= threshold.rank()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Reserved for the live status line. Ranks below `Error` so it passes
    /// every threshold.
    Status,
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
    /// Maximum rank, used to unmute every sink.
    Silly,
}

impl LogLevel {
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Status,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Silly,
    ];

    pub fn rank(self) -> i8 {
        match self {
            LogLevel::Status => -1,
            LogLevel::Error => 0,
            LogLevel::Warn => 1,
            LogLevel::Info => 2,
            LogLevel::Verbose => 3,
            LogLevel::Debug => 4,
            LogLevel::Silly => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Status => "status",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Silly => "silly",
        }
    }

    /// Whether a sink with this threshold accepts a message at `level`.
    pub fn admits(self, level: LogLevel) -> bool {
        level.rank() <= self.rank()
    }

    /// Moves `steps` ranks towards `Silly`, saturating.
    pub fn raised_by(self, steps: u8) -> LogLevel {
        let rank = (self.rank() as i16 + steps as i16).min(LogLevel::Silly.rank() as i16);
        LogLevel::ALL
            .into_iter()
            .find(|level| level.rank() as i16 == rank)
            .unwrap_or(LogLevel::Silly)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| eyre::eyre!("Unknown log level '{}'", s))
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Silly,
        }
    }
}

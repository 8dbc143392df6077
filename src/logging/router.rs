use std::{fmt, io::IsTerminal, str::FromStr};

use crate::{config::Config, utils::is_running_in_container};

/// Where the process output ends up. Computed once per logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Attached to a terminal somebody is watching; a live region exists.
    Interactive,
    /// Detached (container, pipe, CI). No live region.
    Container,
}

impl RunMode {
    pub fn detect() -> Self {
        if is_running_in_container() || !std::io::stdout().is_terminal() {
            RunMode::Container
        } else {
            RunMode::Interactive
        }
    }

    pub fn is_interactive(self) -> bool {
        self == RunMode::Interactive
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Interactive => write!(f, "interactive"),
            RunMode::Container => write!(f, "container"),
        }
    }
}

/// A requested destination for a message.
///
/// `Stdout`, `Human` and `Json` are concrete. `Console` and `Container` name
/// the terminal in one run mode only, and `Log` expands to every durable
/// channel (plus the terminal in container mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Human,
    Json,
    Console,
    Container,
    Log,
}

impl Channel {
    pub fn targets_terminal(self) -> bool {
        matches!(self, Channel::Console | Channel::Stdout)
    }
}

impl FromStr for Channel {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdout" => Ok(Channel::Stdout),
            "human" => Ok(Channel::Human),
            "json" => Ok(Channel::Json),
            "console" => Ok(Channel::Console),
            "container" => Ok(Channel::Container),
            "log" => Ok(Channel::Log),
            other => Err(eyre::eyre!("Unknown channel '{}'", other)),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Stdout => "stdout",
            Channel::Human => "human",
            Channel::Json => "json",
            Channel::Console => "console",
            Channel::Container => "container",
            Channel::Log => "log",
        };
        f.write_str(name)
    }
}

/// The concrete sink groups a message can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputChannel {
    Stdout,
    Human,
    Json,
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputChannel::Stdout => write!(f, "stdout"),
            OutputChannel::Human => write!(f, "human"),
            OutputChannel::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedChannels {
    pub console: bool,
    pub human: bool,
    pub json: bool,
}

impl ResolvedChannels {
    pub const NONE: ResolvedChannels = ResolvedChannels {
        console: false,
        human: false,
        json: false,
    };

    pub fn contains(&self, channel: OutputChannel) -> bool {
        match channel {
            OutputChannel::Stdout => self.console,
            OutputChannel::Human => self.human,
            OutputChannel::Json => self.json,
        }
    }
}

/// Resolves requested channels against the run mode and static config.
#[derive(Debug, Clone)]
pub struct Router {
    run_mode: RunMode,
    defaults: ResolvedChannels,
}

impl Router {
    pub fn new(run_mode: RunMode, config: &Config) -> Self {
        Self {
            run_mode,
            defaults: ResolvedChannels {
                console: config.stdout.output,
                human: config.human_log.path.is_some(),
                json: config.json_log.path.is_some() || config.remote.is_complete(),
            },
        }
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// `None` falls back to configuration; an empty slice suppresses the
    /// message everywhere.
    pub fn resolve(&self, requested: Option<&[Channel]>) -> ResolvedChannels {
        let Some(channels) = requested else {
            return self.defaults;
        };

        if channels.is_empty() {
            return ResolvedChannels::NONE;
        }

        let has = |channel: Channel| channels.contains(&channel);

        let console = has(Channel::Stdout)
            || match self.run_mode {
                RunMode::Interactive => has(Channel::Console),
                RunMode::Container => has(Channel::Container) || has(Channel::Log),
            };

        ResolvedChannels {
            console,
            human: has(Channel::Human) || has(Channel::Log),
            json: has(Channel::Json) || has(Channel::Log),
        }
    }
}

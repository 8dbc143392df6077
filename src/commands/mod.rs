use std::{fmt::Display, path::PathBuf};

use clap::{command, Parser, Subcommand};
use eyre::Context;
use sherlog::{Builder, LogLevel, Logger, Options};
use tracing_subscriber::EnvFilter;

mod info;
mod log;
mod monitor;
mod progress;
mod status;

#[derive(Subcommand, Debug)]
pub enum SherlogCmd {
    Log(log::Cmd),

    Status(status::Cmd),

    Progress(progress::Cmd),

    Monitor(monitor::Cmd),

    Info(info::Cmd),
}

impl Display for SherlogCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SherlogCmd::Log(cmd) => write!(f, "log {}", cmd.level),
            SherlogCmd::Status(_cmd) => write!(f, "status"),
            SherlogCmd::Progress(cmd) => write!(f, "progress {}", cmd.name),
            SherlogCmd::Monitor(_cmd) => write!(f, "monitor"),
            SherlogCmd::Info(_cmd) => write!(f, "info"),
        }
    }
}

#[derive(Parser)]
#[command(version, long_version = "")]
#[command(about = "Leveled logging with a live status region, from the CLI.", long_about = None, disable_help_subcommand = true)]
pub struct Sherlog {
    #[arg(
        global = true,
        long,
        help = "Minimum level written to every sink. Defaults to SHERLOG_LEVEL, or info.",
        display_order = 0
    )]
    pub level: Option<LogLevel>,

    #[arg(
        global = true,
        long,
        value_name = "PATH",
        help = "Also write human readable lines to this file.",
        display_order = 0
    )]
    pub human_log: Option<PathBuf>,

    #[arg(
        global = true,
        long,
        value_name = "PATH",
        help = "Also write one JSON object per line to this file.",
        display_order = 0
    )]
    pub json_log: Option<PathBuf>,

    #[arg(global = true, long, help = "Don't write to the console.", display_order = 1)]
    pub no_stdout: bool,

    #[arg(
        global = true,
        long,
        help = "Hide the resource monitor line.",
        display_order = 1
    )]
    pub no_monitor: bool,

    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        help = "Raise the level by one step per occurrence.",
        display_order = 999
    )]
    pub verbose: u8,

    #[arg(
        global = true,
        long,
        help = "Write sherlog's own diagnostics to stderr. Filtered with RUST_LOG.",
        display_order = 999
    )]
    pub trace: bool,

    #[command(subcommand)]
    pub cmd: SherlogCmd,
}

impl Sherlog {
    fn options(&self) -> Options {
        let level = match (self.level, self.verbose) {
            (level, 0) => level,
            (level, steps) => Some(level.unwrap_or(LogLevel::Info).raised_by(steps)),
        };

        Options {
            level,
            human_log_path: self.human_log.clone(),
            json_log_path: self.json_log.clone(),
            stdout_output: self.no_stdout.then_some(false),
            monitor_display: self.no_monitor.then_some(false),
            ..Options::default()
        }
    }

    fn setup_tracing(&self) -> eyre::Result<()> {
        if !self.trace {
            return Ok(());
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sherlog=debug"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| eyre::eyre!("{}", err))
            .context("Failed installing the tracing subscriber")
    }

    pub fn run(self) -> eyre::Result<()> {
        self.setup_tracing()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed starting the tokio runtime")?;

        tracing::debug!(target: "sherlog", "running command {}", &self.cmd);

        let result = runtime.block_on(async {
            let logger = Builder::new().with_options(self.options()).build();
            logger.capture_panics();

            let result = self.invoke_sub_command(&logger).await;
            logger.flush();
            result
        });

        if let Err(err) = &result {
            tracing::debug!(target: "sherlog", "failed running command {}, error={} cause={}", &self.cmd, err, err.root_cause());
        }

        result
    }

    async fn invoke_sub_command(&self, logger: &Logger) -> eyre::Result<()> {
        match &self.cmd {
            SherlogCmd::Log(cmd) => cmd.run(logger),
            SherlogCmd::Status(cmd) => cmd.run(logger),
            SherlogCmd::Progress(cmd) => cmd.run(logger).await,
            SherlogCmd::Monitor(cmd) => cmd.run(logger).await,
            SherlogCmd::Info(cmd) => cmd.run(logger),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_level() {
        let cli = Sherlog::parse_from(["sherlog", "-vv", "info"]);
        assert_eq!(cli.options().level, Some(LogLevel::Debug));

        let cli = Sherlog::parse_from(["sherlog", "--level", "warn", "-v", "info"]);
        assert_eq!(cli.options().level, Some(LogLevel::Info));
    }

    #[test]
    fn switches_only_set_what_they_name() {
        let cli = Sherlog::parse_from(["sherlog", "--no-monitor", "info"]);
        let options = cli.options();

        assert_eq!(options.monitor_display, Some(false));
        assert_eq!(options.stdout_output, None);
        assert_eq!(options.level, None);
    }

    #[test]
    fn log_subcommand_parses_channels_and_data() {
        let cli = Sherlog::parse_from([
            "sherlog",
            "log",
            "warn",
            "disk almost full",
            "--channel",
            "console",
            "--channel",
            "json",
            "--data",
            r#"{"free": 12}"#,
        ]);

        match cli.cmd {
            SherlogCmd::Log(cmd) => {
                assert_eq!(cmd.level, LogLevel::Warn);
                assert_eq!(cmd.channel.len(), 2);
                assert!(cmd.data.is_some());
            }
            _ => panic!("expected the log subcommand"),
        }
    }
}

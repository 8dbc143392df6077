use clap::Args;
use eyre::Context;
use serde_json::Value;
use sherlog::{Channel, LogLevel, Logger, MessageOptions};

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(help = "One of error, warn, info, verbose, debug, silly or status.")]
    pub level: LogLevel,

    pub message: String,

    #[arg(
        long,
        help = "Restrict the message to these channels: stdout, human, json, console, container or log. Repeatable."
    )]
    pub channel: Vec<Channel>,

    #[arg(long, help = "Pass an empty channel list, which writes nowhere.")]
    pub silent: bool,

    #[arg(long, value_parser = parse_json, help = "Structured data attached to the message, as JSON.")]
    pub data: Option<Value>,

    #[arg(long, help = "Text written to the log files instead of MESSAGE.")]
    pub logging_message: Option<String>,
}

fn parse_json(input: &str) -> eyre::Result<Value> {
    serde_json::from_str(input).context("Invalid JSON")
}

impl Cmd {
    pub fn options(&self) -> MessageOptions {
        let mut options = MessageOptions::new();

        if self.silent {
            options = options.channels(Vec::new());
        } else if !self.channel.is_empty() {
            options = options.channels(self.channel.iter().copied());
        }

        if let Some(data) = &self.data {
            options = options.data(data.clone());
        }

        if let Some(message) = &self.logging_message {
            options = options.logging_message(message);
        }

        options
    }

    pub fn run(&self, logger: &Logger) -> eyre::Result<()> {
        logger.log(self.level, &self.message, &self.options());
        Ok(())
    }
}

use clap::{Args, CommandFactory};
use sherlog::Logger;

use crate::commands::Sherlog;

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cmd {}

fn display_path(path: &Option<std::path::PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl Cmd {
    pub fn run(&self, logger: &Logger) -> eyre::Result<()> {
        let config = logger.config();

        println!(
            "Version:        {}",
            Sherlog::command().get_version().unwrap_or("")
        );
        println!("Run mode:       {}", logger.run_mode());
        println!("Level:          {}", config.level);
        println!(
            "Console:        {}",
            if config.stdout.output { "on" } else { "off" }
        );
        println!("Human log:      {}", display_path(&config.human_log.path));
        println!("JSON log:       {}", display_path(&config.json_log.path));
        println!(
            "Remote:         {}",
            config.remote.project_id.as_deref().unwrap_or("-")
        );
        println!(
            "Monitor:        every {} ms, logged at least every {} s",
            config.monitor.update_interval.as_millis(),
            config.monitor.max_interval.as_secs()
        );
        Ok(())
    }
}

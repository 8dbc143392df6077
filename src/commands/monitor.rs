use std::time::Duration;

use clap::Args;
use sherlog::Logger;

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = "5s",
        help = "How long to keep the monitor line up."
    )]
    pub duration: Duration,
}

impl Cmd {
    pub async fn run(&self, logger: &Logger) -> eyre::Result<()> {
        logger.start_monitor();
        tokio::time::sleep(self.duration).await;

        if let Some(monitor) = logger.monitor() {
            logger.info(monitor.log_message());
        }

        logger.stop_monitor();
        logger.clear_status();
        Ok(())
    }
}

use std::time::Duration;

use clap::Args;
use sherlog::{utils::format_elapsed, Logger, ProgressOptions};

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(long, default_value = "progress")]
    pub name: String,

    #[arg(long, help = "Number of ticks until the tracker is done.")]
    pub limit: u64,

    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = "100ms",
        help = "Pause between two ticks, e.g. 250ms or 1s."
    )]
    pub delay: Duration,
}

impl Cmd {
    pub async fn run(&self, logger: &Logger) -> eyre::Result<()> {
        let tracker = logger.progress(
            ProgressOptions::named(&self.name)
                .limit(self.limit)
                .update_interval(self.delay),
        );

        for step in 1..=self.limit {
            tokio::time::sleep(self.delay).await;
            tracker.tick_with(1, Some(format!("step {}", step)));
        }

        logger.info(format!(
            "{} finished after {}",
            tracker.name(),
            format_elapsed(tracker.elapsed())
        ));

        Ok(())
    }
}

use clap::Args;
use sherlog::{Logger, MessageOptions};

#[derive(Args, Debug)]
pub struct Cmd {
    pub message: String,

    #[arg(long, help = "Erase the live region afterwards.")]
    pub clear: bool,
}

impl Cmd {
    pub fn run(&self, logger: &Logger) -> eyre::Result<()> {
        logger.status(&self.message, &MessageOptions::default());

        if self.clear {
            logger.clear_status();
        }

        Ok(())
    }
}

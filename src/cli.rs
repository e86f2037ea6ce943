use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "picoclaw")]
#[command(about = "Personal multi-agent automation daemon", long_about = None)]
#[command(disable_version_flag = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Talk to the agent: one-shot with -m, interactive otherwise.
    Agent {
        /// Message to process in one shot.
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Start the background daemon with channels, cron and heartbeat.
    Gateway {
        /// Verbose logging.
        #[arg(short, long)]
        debug: bool,
    },

    /// Interactive configuration wizard.
    Setup,

    /// Print the version and exit.
    Version,
}

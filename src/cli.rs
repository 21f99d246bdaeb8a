use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "transatlantic",
    author,
    version,
    about = "Pull finished downloads from a satellite host and clear them from the download client",
    long_about = None
)]
pub struct Cli {
    /// Config file (default: ~/.config/transatlantic/config.toml)
    #[arg(short, long, env = "TRANSATLANTIC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase console verbosity (-v warn, -vv info, -vvv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Transfer new files and remove them from the download client (default)
    Run,
    /// Show which files would be transferred, without copying anything
    Diff,
    /// Show the stored transfer speed estimate
    Speed {
        /// Forget the stored estimate
        #[arg(long)]
        reset: bool,
    },
}

impl Cli {
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

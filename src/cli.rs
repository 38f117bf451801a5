use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for one-shot commands.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[derive(Parser, Debug)]
#[command(name = "authcode")]
#[command(version, about = "Time-based one-time passwords with a local history")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to <config dir>/authcode/config.json)
    #[arg(long, global = true, env = "AUTHCODE_CONFIG")]
    pub config: Option<PathBuf>,

    /// History file (overrides the config file)
    #[arg(long, global = true, env = "AUTHCODE_HISTORY")]
    pub history_file: Option<PathBuf>,

    /// Mask codes and seeds
    #[arg(long, global = true)]
    pub privacy: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the current code for a secret and record it in the history
    Code(CodeArgs),

    /// Live countdown for a secret and every history entry (Ctrl-C to quit)
    Watch(WatchArgs),

    /// History management
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Clear the history and delete the history file
    Reset,
}

#[derive(Args, Debug)]
pub struct CodeArgs {
    /// Base32 secret (spaces and lower case are fine)
    pub secret: String,

    /// Name for a new history entry
    #[arg(short, long)]
    pub name: Option<String>,

    /// Show the seed next to this entry in listings
    #[arg(long)]
    pub reveal: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Base32 secret for the primary slot
    pub secret: Option<String>,

    /// Name for a new history entry
    #[arg(short, long, requires = "secret")]
    pub name: Option<String>,

    /// Show the seed next to this entry in listings
    #[arg(long, requires = "secret")]
    pub reveal: bool,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List entries, most recent first, with their current codes
    List,

    /// Rename an entry
    Rename {
        /// Entry id
        id: String,
        /// New display name
        name: String,
    },

    /// Delete an entry
    Delete {
        /// Entry id
        id: String,
    },

    /// Remove every entry
    Clear,
}

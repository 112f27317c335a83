use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct TransferFlags {
    #[clap(long, help = "Region of the volume (defaults to the configured region)")]
    pub region: Option<String>,
    #[clap(long, help = "Plain text progress for logs and non-interactive terminals")]
    pub simple: bool,
    #[clap(short, long, help = "Write debug logs to ~/.volcp/logs")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[clap(
        about = "Upload a local file or directory to the volume",
        name = "cp",
        display_order = 1
    )]
    Cp {
        #[clap(help = "Local file or directory")]
        local: PathBuf,
        #[clap(help = "Remote destination path; a trailing '/' means \"into this directory\"")]
        remote: String,
        #[clap(flatten)]
        flags: TransferFlags,
    },
    #[clap(about = "Download a remote file or directory", name = "download", display_order = 2)]
    Download {
        #[clap(help = "Remote file or directory")]
        remote: String,
        #[clap(help = "Local destination path")]
        local: PathBuf,
        #[clap(flatten)]
        flags: TransferFlags,
    },
}

impl Commands {
    pub fn flags(&self) -> &TransferFlags {
        match self {
            Commands::Cp { flags, .. } | Commands::Download { flags, .. } => flags,
        }
    }
}

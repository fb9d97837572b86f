use clap::{Parser, Subcommand};
use std::path::PathBuf;
use torrentbox::session::{SelectionSet, SourceDescriptor};

#[derive(Parser, Debug)]
#[command(name = "torrentbox")]
#[command(
    about = "Drive an aria2 engine to fetch torrents and collect the results",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (defaults to TORRENTBOX_CONFIG or config/torrentbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download magnet links or .torrent files, one after another
    Download(DownloadArgs),
    /// Show the file list of a .torrent file without downloading it
    Inspect(InspectArgs),
    /// List files in the output directory
    List,
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// Magnet URIs or paths to .torrent files
    #[arg(required = true)]
    pub items: Vec<SourceDescriptor>,

    /// Zero-based file indices to download from .torrent items, e.g. "0,2"
    #[arg(long)]
    pub select: Option<SelectionSet>,

    /// Leave artifacts in the download directory
    #[arg(long)]
    pub no_postprocess: bool,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Path to a .torrent file
    pub torrent: PathBuf,
}

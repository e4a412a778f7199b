use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "djvupress",
    version,
    about = "Convert raster PDF/PS documents to DJVU using external converter backends"
)]
pub struct Cli {
    /// Verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Manage converter backends.
    Backend {
        #[command(subcommand)]
        command: BackendCommand,
    },
    /// Convert documents to DJVU.
    Convert(ConvertArgs),
}

#[derive(Debug, Subcommand)]
pub enum BackendCommand {
    /// Download and install a backend into the managed directory.
    Install {
        name: String,

        /// Answer yes to every confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Select the backend `convert` uses.
    Set { name: String },
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).multiple(false)))]
pub struct ConvertArgs {
    /// Convert the file at this path.
    #[arg(short, long, group = "target")]
    pub path: Option<PathBuf>,

    /// Convert the library document with this id.
    #[arg(short, long, group = "target")]
    pub id: Option<usize>,

    /// Convert every library document that has no DJVU rendition yet.
    #[arg(long, group = "target")]
    pub all: bool,

    /// Convert even when the raster check calls the document markup-based.
    #[arg(long)]
    pub force: bool,

    /// Library root, overriding the configured one.
    #[arg(long)]
    pub library: Option<PathBuf>,
}

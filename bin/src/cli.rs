use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect how notebook cells map into per-language virtual documents
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file, instead of the discovered or embedded one
    #[arg(long, global = true, env = "CELLMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log file or directory
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print every virtual document built from a notebook
    Dump {
        /// `.ipynb` file
        notebook: PathBuf,
    },

    /// Resolve a notebook position to its document, virtual position and cell
    Resolve {
        /// `.ipynb` file
        notebook: PathBuf,

        /// Line across all code cells, starting at 0
        line: u32,

        /// Column in characters, starting at 0
        column: u32,
    },
}

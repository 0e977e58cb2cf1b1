//! Command line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tabfeed - read RSS and Atom feeds in the terminal.
#[derive(Debug, Parser)]
#[command(name = "tabfeed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the cache file (overrides TABFEED_CACHE_PATH)
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch feeds (or serve them from the cache) and print their articles
    Read {
        /// Feed URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print at most this many articles per feed
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List cached feeds and whether they are still fresh
    Cache,

    /// Print the active colorscheme
    Colors,

    /// Convert a pywal colors.json into a tabfeed colorscheme
    ConvertColors {
        /// pywal file to read (default: <cache dir>/wal/colors.json)
        #[arg(long)]
        wal: Option<PathBuf>,

        /// Where to write the colorscheme (default: configured colorscheme path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

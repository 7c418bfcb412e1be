//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Default number of images fetched per term.
pub const DEFAULT_NUM_IMAGES: i64 = 20;

/// Download images for a list of search terms.
///
/// Each term gets its own directory under the output root; images are saved
/// as `<term>_<n>.jpg`.
#[derive(Parser, Debug)]
#[command(name = "image-loader")]
#[command(author, version, about)]
pub struct Args {
    /// Search terms, one directory each
    #[arg(short = 'k', long = "keys", value_name = "TERM", num_args = 1.., required = true)]
    pub keys: Vec<String>,

    /// Maximum images per term (must be positive)
    #[arg(short = 'n', long, default_value_t = DEFAULT_NUM_IMAGES, allow_negative_numbers = true)]
    pub num_images: i64,

    /// Root directory for the term directories [default: ~/image-loads]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Suffix term directories with today's date (cats_2024-03-01)
    #[arg(long)]
    pub date_stamp: bool,

    /// Maximum concurrent downloads (1-100) [default: available CPUs]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// Path to the Chrome/Chromium executable
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Config file to use instead of ~/.config/image-loader/config.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

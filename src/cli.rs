//! Command-line interface definitions.
//!
//! All arguments are defined with the clap derive API. Short flags
//! follow the traditional hardlink tool conventions (`-f`, `-T`, `-P`,
//! `-n`, `-s`, `-S`, `-x`, `-m`, `-p`, `-o`, `-q`).
//!
//! # Example
//!
//! ```bash
//! # Link identical files under two trees, asking before each merge
//! hardlinker /srv/mirror /srv/backup
//!
//! # Simulate only, with statistics
//! hardlinker --dry-run /srv/mirror
//!
//! # Identical names only, at least 1 MiB, skip VCS metadata
//! hardlinker -f -s 1MiB -x '\.git/' /srv/mirror
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Scan for and hardlink identical files.
///
/// Walks the given directories, groups files by size (and optionally
/// modification time), compares candidates byte for byte, and merges
/// identical files into shared inodes with hard links. Paths, metadata
/// and existing link relationships are preserved.
#[derive(Debug, Parser)]
#[command(name = "hardlinker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// One or more search directories
    #[arg(value_name = "DIRECTORY")]
    pub directories: Vec<PathBuf>,

    /// Filenames have to be identical
    #[arg(short = 'f', long)]
    pub filenames_equal: bool,

    /// File modification times have to be identical
    #[arg(short = 'T', long)]
    pub timestamp: bool,

    /// File properties (mode, owner, group) have to match
    #[arg(short = 'P', long)]
    pub properties: bool,

    /// Dry-run only, no changes to files
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation prompts and trust same-run inode matches
    #[arg(short = 'y', long)]
    pub no_confirm: bool,

    /// Minimum file size (plain bytes or a suffix like 1KiB, 2MB)
    #[arg(short = 's', long, value_name = "SIZE", default_value = "0", value_parser = parse_size)]
    pub min_size: u64,

    /// Maximum file size; 0 means unbounded
    #[arg(short = 'S', long, value_name = "SIZE", default_value = "0", value_parser = parse_size)]
    pub max_size: u64,

    /// Regular expression used to exclude files/dirs (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Shell pattern used to match files
    #[arg(short = 'm', long = "match", value_name = "PATTERN")]
    pub match_pattern: Option<String>,

    /// Output list of previously created hardlinks
    #[arg(short = 'p', long)]
    pub print_previous: bool,

    /// Output list of hardlinked files
    #[arg(short = 'o', long)]
    pub output: bool,

    /// Skip printing statistics
    #[arg(short = 'q', long = "no-stats", action = clap::ArgAction::SetFalse)]
    pub statistics: bool,

    /// Keep a persistent index in the working directory for
    /// incremental re-scans
    #[arg(long = "db")]
    pub persistent: bool,

    /// Increase verbosity (-v for comparisons, -vv for per-file tracing)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Parse a size argument: plain bytes or any `bytesize` suffix.
fn parse_size(text: &str) -> Result<u64, String> {
    if let Ok(plain) = text.parse::<u64>() {
        return Ok(plain);
    }
    text.parse::<bytesize::ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("invalid size '{text}': {e}"))
}

//! Validated run settings.
//!
//! [`Settings`] is the bridge between the raw CLI arguments and the
//! engine: directories are canonicalized and checked, exclusion regexes
//! and the match glob are compiled, and the matching switches are
//! collected into a [`MatchPolicy`]. A non-directory argument is a
//! configuration error and aborts before any scanning begins.

use std::path::PathBuf;

use glob::Pattern;
use regex::Regex;

use crate::cli::Cli;
use crate::index::{MatchPolicy, STORE_FILE_NAME};

/// Errors detected while assembling settings; all are fatal.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A search root does not exist or is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// No search directory was given.
    #[error("specify one or more search directories")]
    NoDirectories,

    /// An exclusion pattern failed to compile.
    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidExclude {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The shell match pattern failed to compile.
    #[error("invalid match pattern '{pattern}': {source}")]
    InvalidMatch {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// The working directory (for the persistent index) is unknown.
    #[error("cannot determine working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),
}

/// Everything the engine needs to know about one run.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Validated search roots.
    pub directories: Vec<PathBuf>,
    /// Compiled full-path exclusion patterns.
    pub exclude: Vec<Regex>,
    /// Compiled shell-glob pattern file names must match.
    pub match_pattern: Option<Pattern>,
    /// Minimum file size in bytes.
    pub min_size: u64,
    /// Maximum file size in bytes; `None` means unbounded.
    pub max_size: Option<u64>,
    /// Filenames must be identical for a merge.
    pub same_name: bool,
    /// Modification times must be identical for a merge.
    pub same_timestamp: bool,
    /// Mode, uid and gid must be identical for a merge.
    pub same_properties: bool,
    /// Simulate only: no filesystem mutation.
    pub dry_run: bool,
    /// Skip confirmation prompts and trust same-run inode matches.
    pub no_confirm: bool,
    /// Path of the persistent index file; `Some` enables persistence.
    pub store_path: Option<PathBuf>,
}

impl Settings {
    /// Validate CLI arguments into settings.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.directories.is_empty() {
            return Err(ConfigError::NoDirectories);
        }

        let mut directories = Vec::with_capacity(cli.directories.len());
        for directory in &cli.directories {
            let canonical = directory
                .canonicalize()
                .map_err(|_| ConfigError::NotADirectory(directory.clone()))?;
            if !canonical.is_dir() {
                return Err(ConfigError::NotADirectory(directory.clone()));
            }
            directories.push(canonical);
        }

        let mut exclude = Vec::with_capacity(cli.exclude.len());
        for pattern in &cli.exclude {
            let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidExclude {
                pattern: pattern.clone(),
                source,
            })?;
            exclude.push(regex);
        }

        let match_pattern = match &cli.match_pattern {
            Some(pattern) => Some(Pattern::new(pattern).map_err(|source| {
                ConfigError::InvalidMatch {
                    pattern: pattern.clone(),
                    source,
                }
            })?),
            None => None,
        };

        let store_path = if cli.persistent {
            let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
            Some(cwd.join(STORE_FILE_NAME))
        } else {
            None
        };

        Ok(Self {
            directories,
            exclude,
            match_pattern,
            min_size: cli.min_size,
            max_size: if cli.max_size == 0 {
                None
            } else {
                Some(cli.max_size)
            },
            same_name: cli.filenames_equal,
            same_timestamp: cli.timestamp,
            same_properties: cli.properties,
            dry_run: cli.dry_run,
            no_confirm: cli.no_confirm,
            store_path,
        })
    }

    /// The candidate-matching switches as a policy.
    #[must_use]
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            same_name: self.same_name,
            same_timestamp: self.same_timestamp,
            same_properties: self.same_properties,
        }
    }
}

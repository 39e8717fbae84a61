//! Scanner module for directory traversal and file discovery.
//!
//! # Overview
//!
//! This module walks a worklist of directories and yields one
//! [`FileObservation`] per regular file that survives the configured
//! filters. Observations carry the full stat snapshot (inode, device,
//! size, timestamps, mode, ownership, link count) that the fingerprint
//! index and merge engine need downstream.
//!
//! The scanner is divided into submodules:
//! - [`walker`]: LIFO worklist traversal and per-entry filtering
//!
//! # Example
//!
//! ```no_run
//! use hardlinker::scanner::{ScanFilter, Walker};
//! use std::path::PathBuf;
//!
//! let filter = ScanFilter::default();
//! let walker = Walker::new(vec![PathBuf::from("/srv/mirror")], filter);
//! for entry in walker {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod walker;

use std::ffi::CString;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use walker::Walker;

/// Fallback hardlink limit when `pathconf` cannot report one.
///
/// `pathconf(_PC_LINK_MAX)` legitimately returns -1 with no error on
/// filesystems without a fixed limit; treating that as unbounded keeps
/// such filesystems scannable.
pub const DEFAULT_MAXIMUM_LINKS: u64 = u64::MAX;

/// A second-plus-nanosecond timestamp as reported by `stat`.
///
/// Ordered lexicographically (seconds, then nanoseconds), which matches
/// filesystem time ordering. Used for both the fingerprint key in
/// timestamp-matching mode and the "strictly later" attribute
/// reconciliation rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch.
    pub secs: i64,
    /// Nanosecond remainder.
    pub nanos: u32,
}

impl Timestamp {
    /// Create a timestamp from raw stat fields.
    #[must_use]
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Convert to a [`filetime::FileTime`] for `utimes`-style calls.
    #[must_use]
    pub fn to_filetime(self) -> filetime::FileTime {
        filetime::FileTime::from_unix_time(self.secs, self.nanos)
    }
}

/// A stat snapshot of one regular file, as discovered by the walker.
///
/// This is the unit of work handed to the fingerprint index. All fields
/// come from a single `lstat` call at discovery time.
#[derive(Debug, Clone)]
pub struct FileObservation {
    /// Absolute path of the directory entry.
    pub path: PathBuf,
    /// Device id the inode lives on.
    pub device: u64,
    /// Inode id.
    pub inode: u64,
    /// File size in bytes.
    pub size: u64,
    /// Current hard link count.
    pub links: u64,
    /// Last modification time.
    pub mtime: Timestamp,
    /// Last access time.
    pub atime: Timestamp,
    /// Permission mode bits.
    pub mode: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
}

impl FileObservation {
    /// Build an observation from a path and its (non-following) metadata.
    #[must_use]
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        Self {
            device: metadata.dev(),
            inode: metadata.ino(),
            size: metadata.len(),
            links: metadata.nlink(),
            mtime: Timestamp::new(metadata.mtime(), metadata.mtime_nsec() as u32),
            atime: Timestamp::new(metadata.atime(), metadata.atime_nsec() as u32),
            mode: metadata.mode(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            path,
        }
    }

    /// The final path component, used for name-equality matching.
    ///
    /// Paths yielded by the walker always name a directory entry, so a
    /// missing file name only occurs for hand-built observations.
    #[must_use]
    pub fn file_name(&self) -> &std::ffi::OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }
}

/// Filters applied to directory entries during the walk.
///
/// A default filter admits every non-empty regular file.
#[derive(Debug, Default)]
pub struct ScanFilter {
    /// Minimum file size to include (in bytes).
    pub min_size: u64,
    /// Maximum file size to include; `None` means unbounded.
    pub max_size: Option<u64>,
    /// Full-path exclusion patterns. Any match skips the entry (and, for
    /// directories, its whole subtree).
    pub exclude: Vec<Regex>,
    /// Optional shell-glob pattern the file name must match.
    pub match_pattern: Option<Pattern>,
    /// Filesystem hardlink limit; files already at the limit are skipped.
    pub maximum_links: u64,
    /// Exact paths to skip (the persistent index file).
    pub skip_paths: Vec<PathBuf>,
}

impl ScanFilter {
    /// Whether a path is excluded by pattern or by the exact skip list.
    #[must_use]
    pub fn excludes(&self, path: &Path) -> bool {
        if self.skip_paths.iter().any(|p| p == path) {
            return true;
        }
        let text = path.to_string_lossy();
        self.exclude.iter().any(|re| re.is_match(&text))
    }

    /// Whether a file observation passes the size, link-count and
    /// name-match filters.
    #[must_use]
    pub fn admits(&self, observation: &FileObservation) -> bool {
        if observation.size == 0 || observation.size < self.min_size {
            return false;
        }
        if let Some(max) = self.max_size {
            if observation.size > max {
                return false;
            }
        }
        if self.maximum_links > 0 && observation.links >= self.maximum_links {
            return false;
        }
        if let Some(pattern) = &self.match_pattern {
            let name = observation.file_name().to_string_lossy();
            if !pattern.matches(&name) {
                return false;
            }
        }
        true
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// A directory could not be listed; its subtree is skipped.
    #[error("Failed to list {path}: {source}")]
    Listing {
        /// The directory that failed to list.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A directory entry could not be stat'ed.
    #[error("Failed to stat {path}: {source}")]
    Stat {
        /// Path where the error occurred.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// The path the error is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Listing { path, .. } | Self::Stat { path, .. } => path,
        }
    }
}

/// Query the filesystem's maximum hardlink count for a path.
///
/// Uses `pathconf(_PC_LINK_MAX)`. Returns [`DEFAULT_MAXIMUM_LINKS`] when
/// the limit is unavailable or unbounded.
#[must_use]
pub fn maximum_links(path: &Path) -> u64 {
    use std::os::unix::ffi::OsStrExt;

    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return DEFAULT_MAXIMUM_LINKS;
    };
    // pathconf returns -1 both for errors and for "no limit"
    let limit = unsafe { libc::pathconf(cpath.as_ptr(), libc::_PC_LINK_MAX) };
    if limit <= 0 {
        DEFAULT_MAXIMUM_LINKS
    } else {
        limit as u64
    }
}

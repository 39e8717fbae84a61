//! Worklist-based directory walker.
//!
//! # Overview
//!
//! The walker maintains an explicit LIFO stack of directories instead of
//! recursing, so arbitrarily deep trees cannot exhaust the call stack.
//! Each popped directory is listed once; subdirectories are pushed back
//! onto the stack and files are filtered and yielded as
//! [`FileObservation`]s.
//!
//! Errors are yielded inline as [`ScanError`] values rather than stopping
//! iteration: a directory that cannot be listed simply drops its subtree,
//! and an entry that cannot be stat'ed is skipped.

use std::fs;
use std::path::PathBuf;

use super::{FileObservation, ScanError, ScanFilter};

/// Directory walker yielding filtered file observations.
///
/// Symbolic links are never followed. Excluded paths (regex on the full
/// path, or the exact skip list) are pruned before descent, so an
/// excluded directory's subtree is never listed.
///
/// Entries within a directory are processed in name order, so repeated
/// scans of the same tree visit files in the same order regardless of
/// readdir ordering. A simulated run and a later real run therefore
/// make the same routing decisions.
#[derive(Debug)]
pub struct Walker {
    /// Directories still to be listed, popped LIFO.
    worklist: Vec<PathBuf>,
    /// The sorted listing currently being drained.
    current: std::vec::IntoIter<Result<fs::DirEntry, std::io::Error>>,
    filter: ScanFilter,
}

impl Walker {
    /// Create a walker over the given root directories.
    ///
    /// Roots are assumed to be validated directories; a root that fails
    /// to list is reported like any other directory.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, filter: ScanFilter) -> Self {
        Self {
            worklist: roots,
            current: Vec::new().into_iter(),
            filter,
        }
    }

    /// Open the next directory from the worklist.
    ///
    /// Returns a listing error to yield, or `Ok(false)` when the
    /// worklist is exhausted. Entries are sorted by name for
    /// deterministic processing order; unreadable entries sort first.
    fn advance(&mut self) -> Result<bool, ScanError> {
        if let Some(directory) = self.worklist.pop() {
            match fs::read_dir(&directory) {
                Ok(read_dir) => {
                    log::trace!("Scanning directory: {}", directory.display());
                    let mut entries: Vec<_> = read_dir.collect();
                    entries.sort_by(|a, b| match (a, b) {
                        (Ok(a), Ok(b)) => a.file_name().cmp(&b.file_name()),
                        (Ok(_), Err(_)) => std::cmp::Ordering::Greater,
                        (Err(_), Ok(_)) => std::cmp::Ordering::Less,
                        (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                    });
                    self.current = entries.into_iter();
                    return Ok(true);
                }
                Err(source) => {
                    return Err(ScanError::Listing {
                        path: directory,
                        source,
                    });
                }
            }
        }
        Ok(false)
    }

    /// Process one directory entry, yielding an observation if it is an
    /// admissible file, queueing it if it is a directory, or nothing.
    fn process_entry(&mut self, entry: &fs::DirEntry) -> Option<Result<FileObservation, ScanError>> {
        let path = entry.path();

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(source) => return Some(Err(ScanError::Stat { path, source })),
        };

        // Symbolic links are never followed or linked
        if file_type.is_symlink() {
            log::trace!("Skipping symlink: {}", path.display());
            return None;
        }

        if self.filter.excludes(&path) {
            log::trace!("Excluded: {}", path.display());
            return None;
        }

        if file_type.is_dir() {
            self.worklist.push(path);
            return None;
        }

        if !file_type.is_file() {
            log::trace!("Skipping non-regular file: {}", path.display());
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(source) => return Some(Err(ScanError::Stat { path, source })),
        };

        let observation = FileObservation::from_metadata(path, &metadata);
        if !self.filter.admits(&observation) {
            log::trace!("Filtered: {}", observation.path.display());
            return None;
        }

        log::trace!(
            "File: {} (inode {}, {} bytes)",
            observation.path.display(),
            observation.inode,
            observation.size
        );
        Some(Ok(observation))
    }
}

impl Iterator for Walker {
    type Item = Result<FileObservation, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.current.next() {
                Some(Ok(entry)) => {
                    if let Some(item) = self.process_entry(&entry) {
                        return Some(item);
                    }
                }
                Some(Err(source)) => {
                    // An unreadable entry; report and keep draining
                    return Some(Err(ScanError::Stat {
                        path: PathBuf::new(),
                        source,
                    }));
                }
                None => match self.advance() {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}

//! Cross-run persistence for the fingerprint index.
//!
//! The index is serialized as a flat record list inside a JSON envelope
//! carrying a SHA-256 checksum of the payload. A missing file yields an
//! empty index; a corrupt file (bad JSON, bad checksum, unknown version)
//! is a fatal startup error rather than being silently ignored.
//!
//! Before writing, each record's same-run caches are collapsed (the
//! historical-inode set down to the canonical id, the link projections
//! dropped). On load, aliases are re-baselined to the record's canonical
//! inode so the next run reports only its own work, and paths that
//! vanished between runs are pruned.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::database::{FingerprintIndex, MatchPolicy};
use super::record::{AliasEntry, FileRecord};

/// Fixed name of the persistent index file in the working directory.
pub const STORE_FILE_NAME: &str = ".hardlinker.db";

/// On-disk format version; bumped on incompatible changes.
pub const STORE_VERSION: u32 = 1;

/// Errors raised by the persistent store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The store file exists but could not be read.
    #[error("Failed to read index file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file could not be written.
    #[error("Failed to write index file {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file is not valid JSON or not an index envelope.
    #[error("Corrupt index file {path}: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The payload does not match its recorded checksum.
    #[error("Index file {path} failed its integrity check")]
    ChecksumMismatch { path: std::path::PathBuf },

    /// The file was written by an incompatible version.
    #[error("Unsupported index file version {found} in {path} (expected {expected})")]
    UnsupportedVersion {
        path: std::path::PathBuf,
        found: u32,
        expected: u32,
    },
}

/// Envelope wrapping the serialized records with an integrity checksum.
#[derive(Debug, Serialize, Deserialize)]
struct StoreEnvelope {
    /// SHA-256 checksum (hex) of the compact-serialized payload.
    checksum: String,
    payload: StorePayload,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorePayload {
    version: u32,
    records: Vec<FileRecord>,
}

fn checksum_of(payload: &StorePayload) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Load a persisted index, or an empty one when the file does not exist.
///
/// The policy rebuilds fingerprint buckets from each record's size and
/// modification time, so a saved index seeds runs regardless of which
/// matching switches produced it.
pub fn load(path: &Path, policy: &MatchPolicy) -> Result<FingerprintIndex, StoreError> {
    if !path.exists() {
        log::debug!("No index file at {}, starting empty", path.display());
        return Ok(FingerprintIndex::new());
    }

    let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let envelope: StoreEnvelope =
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

    let checksum = checksum_of(&envelope.payload).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    if checksum != envelope.checksum {
        return Err(StoreError::ChecksumMismatch {
            path: path.to_path_buf(),
        });
    }

    if envelope.payload.version != STORE_VERSION {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: envelope.payload.version,
            expected: STORE_VERSION,
        });
    }

    let mut index = FingerprintIndex::new();
    for mut record in envelope.payload.records {
        rebaseline(&mut record);
        if record.aliases.is_empty() {
            continue;
        }
        index.insert(policy.record_fingerprint(&record), record);
    }
    index.prune_empty();
    log::info!(
        "Loaded {} known inodes from {}",
        index.record_count(),
        path.display()
    );
    Ok(index)
}

/// Reset a loaded record's aliases to the canonical inode and the live
/// link count, dropping aliases that vanished or were replaced by a
/// different inode between runs.
fn rebaseline(record: &mut FileRecord) {
    use std::os::unix::fs::MetadataExt;

    record.strip_run_state();
    let key = record.key();
    let mut live_links = None;
    record.aliases.retain(|path, _| {
        match std::fs::symlink_metadata(path) {
            Ok(metadata) if (metadata.dev(), metadata.ino()) == key => {
                live_links = Some(metadata.nlink());
                true
            }
            Ok(_) => {
                log::warn!("Dropping replaced path from index: {}", path.display());
                false
            }
            Err(_) => {
                log::warn!("Dropping vanished path from index: {}", path.display());
                false
            }
        }
    });
    if let Some(links) = live_links {
        record.links = links;
    }
    let canonical = record.inode;
    let links = record.links;
    for alias in record.aliases.values_mut() {
        *alias = AliasEntry::discovered(canonical, links);
    }
    // The canonical path itself may have vanished; promote another alias
    if !record.aliases.contains_key(&record.path) {
        if let Some(path) = record.aliases.keys().next().cloned() {
            record.path = path;
        }
    }
}

/// Serialize the index to `path`, stripping same-run state first.
pub fn save(index: &FingerprintIndex, path: &Path) -> Result<(), StoreError> {
    let records: Vec<FileRecord> = index
        .records()
        .cloned()
        .map(|mut record| {
            record.strip_run_state();
            record
        })
        .collect();

    let payload = StorePayload {
        version: STORE_VERSION,
        records,
    };
    let checksum = checksum_of(&payload).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let envelope = StoreEnvelope { checksum, payload };

    let json = serde_json::to_string_pretty(&envelope).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "Saved {} known inodes to {}",
        index.record_count(),
        path.display()
    );
    Ok(())
}

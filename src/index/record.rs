//! File records: one tracked inode and its alias bookkeeping.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scanner::{FileObservation, Timestamp};

/// Per-path bookkeeping inside a [`FileRecord`]'s alias map.
///
/// `inode` and `links` are captured when the path is first recorded and
/// preserved across merges, so statistics can tell links that existed
/// before the run from links the run created. `new_links` counts links
/// created against this path during the current run and is therefore
/// zero for every freshly discovered path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    /// Inode the path referred to when first recorded.
    pub inode: u64,
    /// Link count of that inode when the path was first recorded.
    pub links: u64,
    /// Links created against this path during the current run.
    pub new_links: u64,
}

impl AliasEntry {
    /// A freshly discovered alias of `inode` with `links` existing links.
    #[must_use]
    pub fn discovered(inode: u64, links: u64) -> Self {
        Self {
            inode,
            links,
            new_links: 0,
        }
    }
}

/// One inode tracked by the fingerprint index, with every path known to
/// refer to it.
///
/// A record is reachable from the index under exactly one
/// `(device, inode)` key. Merges mutate the surviving record and remove
/// the absorbed one from the index in the same step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Device id the inode lives on.
    pub device: u64,
    /// Canonical inode id.
    pub inode: u64,
    /// Inode ids historically merged into this record during the current
    /// run, the canonical id included. Same-run comparison-skip cache;
    /// collapsed to the canonical id before persistence.
    pub inodes: HashSet<u64>,
    /// Projected remaining on-disk link count per absorbed original
    /// inode. Same-run bookkeeping that keeps per-inode original-link
    /// accounting exact when the disk is not being mutated; cleared
    /// before persistence.
    pub absorbed: BTreeMap<u64, u64>,
    /// File size in bytes.
    pub size: u64,
    /// Tracked modification time (freshest seen across merges).
    pub mtime: Timestamp,
    /// Tracked access time.
    pub atime: Timestamp,
    /// Permission mode bits.
    pub mode: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Current total link count, as last observed or projected.
    pub links: u64,
    /// Canonical path; always present as a key in `aliases`.
    pub path: PathBuf,
    /// Every path found or merged under this inode, exactly once.
    pub aliases: BTreeMap<PathBuf, AliasEntry>,
}

impl FileRecord {
    /// Create a record for a newly discovered file.
    #[must_use]
    pub fn from_observation(observation: &FileObservation) -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert(
            observation.path.clone(),
            AliasEntry::discovered(observation.inode, observation.links),
        );
        let mut inodes = HashSet::new();
        inodes.insert(observation.inode);
        Self {
            device: observation.device,
            inode: observation.inode,
            inodes,
            absorbed: BTreeMap::new(),
            size: observation.size,
            mtime: observation.mtime,
            atime: observation.atime,
            mode: observation.mode,
            uid: observation.uid,
            gid: observation.gid,
            links: observation.links,
            path: observation.path.clone(),
            aliases,
        }
    }

    /// The index key this record lives under.
    #[must_use]
    pub fn key(&self) -> (u64, u64) {
        (self.device, self.inode)
    }

    /// The canonical path's final component.
    #[must_use]
    pub fn file_name(&self) -> &std::ffi::OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }

    /// Record another path observed to refer to this inode.
    ///
    /// The alias's original link count is taken from the record's tracked
    /// `links`, which equals the on-disk value in a real run and stays
    /// consistent in a simulated one. A path that is already recorded is
    /// left untouched (a repeat observation, e.g. overlapping roots).
    pub fn record_alias(&mut self, observation: &FileObservation) {
        if self.aliases.contains_key(&observation.path) {
            log::debug!(
                "Path observed again, already recorded: {}",
                observation.path.display()
            );
            return;
        }
        self.aliases.insert(
            observation.path.clone(),
            AliasEntry::discovered(self.inode, self.links),
        );
        self.refresh_attributes(observation);
    }

    /// Refresh cached attributes from a same-inode observation.
    ///
    /// Attributes only move forward: times and ownership are taken when
    /// the observation's mtime is strictly later than the tracked one,
    /// and the link count only ratchets upward. Projections made during
    /// a simulated run are never clobbered by stale on-disk values.
    pub fn refresh_attributes(&mut self, observation: &FileObservation) {
        if observation.mtime > self.mtime {
            self.mtime = observation.mtime;
            self.atime = observation.atime;
            self.uid = observation.uid;
            self.gid = observation.gid;
            self.mode = observation.mode;
        }
        if observation.links > self.links {
            self.links = observation.links;
        }
    }

    /// Whether this run created any links under this record.
    #[must_use]
    pub fn has_new_links(&self) -> bool {
        self.aliases.values().any(|a| a.new_links > 0)
    }

    /// Aliases that pointed at a multi-linked inode when first recorded.
    #[must_use]
    pub fn already_linked_paths(&self) -> Vec<&Path> {
        self.aliases
            .iter()
            .filter(|(_, a)| a.links > 1)
            .map(|(p, _)| p.as_path())
            .collect()
    }

    /// Collapse same-run caches before cross-run persistence.
    ///
    /// The historical-inode set and the link projections are only
    /// meaningful within the run that created them.
    pub fn strip_run_state(&mut self) {
        self.inodes.clear();
        self.inodes.insert(self.inode);
        self.absorbed.clear();
    }
}

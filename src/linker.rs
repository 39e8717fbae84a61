//! The hardlink-merge engine.
//!
//! # Overview
//!
//! [`merge`] absorbs one file record (the destination) into another (the
//! source) by re-pointing every destination alias at the source's inode.
//! Each alias goes through a three-step protocol ordered so the file's
//! bytes stay reachable under every failure ordering:
//!
//! 1. **Vacate** — rename the alias to a temporary sibling name. A
//!    failure leaves the alias untouched and skips only this alias.
//! 2. **Link** — hard-link the source's canonical path onto the vacated
//!    name. On failure the temporary file is renamed back; if that
//!    recovery also fails the situation is escalated as a critical alert
//!    (the bytes survive under the temporary name) and the run goes on.
//! 3. **Commit** — delete the temporary file, releasing the
//!    destination's now-redundant link, and update bookkeeping.
//!
//! When the destination carries a strictly later modification time, the
//! destination's owner and times are propagated onto the merged inode so
//! the surviving record always reflects the freshest metadata seen.
//!
//! In simulate mode every `rename`/`link`/`unlink`/`chown`/`utimes` call
//! is skipped but the in-memory bookkeeping is identical, which is what
//! keeps dry-run statistics meaningful.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;

use crate::index::{AliasEntry, FileRecord};

/// Reserved suffix for the temporary name used while an alias is being
/// re-pointed. Chosen to be wildly unlikely to collide with real files.
pub const TEMP_SUFFIX: &str = ".$$$__hardlinker__$$$";

/// Result of one merge attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOutcome {
    /// Hard links successfully created (bookkept in simulate mode).
    pub links_created: u64,
    /// Aliases left in their pre-merge state after a failure.
    pub failures: u64,
    /// Every destination alias was absorbed; the destination record is
    /// redundant and must be removed from the index.
    pub absorbed_all: bool,
}

/// The temporary sibling name for a path being vacated.
#[must_use]
fn temporary_name(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Merge `destination` into `source`.
///
/// The caller picks the direction (the record with more links survives)
/// and is responsible for index surgery afterwards: re-inserting the
/// source and, when `absorbed_all` is set, dropping the destination.
/// On partial failure the destination keeps its unabsorbed aliases and
/// stays valid.
pub fn merge(source: &mut FileRecord, destination: &mut FileRecord, dry_run: bool) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    // The destination's merge history becomes the source's: trust and
    // link projections must survive the absorption.
    source.inodes.extend(destination.inodes.iter().copied());
    for (&inode, &remaining) in &destination.absorbed {
        let entry = source.absorbed.entry(inode).or_insert(remaining);
        *entry = (*entry).min(remaining);
    }
    source
        .absorbed
        .entry(destination.inode)
        .or_insert(destination.links);

    let paths: Vec<PathBuf> = destination.aliases.keys().cloned().collect();
    for path in paths {
        if source.aliases.contains_key(&path) {
            // Already tracked by the source (repeat observation); the
            // destination's copy of the alias is redundant.
            log::debug!("Alias already merged: {}", path.display());
            destination.aliases.remove(&path);
            continue;
        }

        let temporary = temporary_name(&path);

        // Vacate
        if !dry_run {
            if let Err(e) = fs::rename(&path, &temporary) {
                log::error!(
                    "Failed to rename {} to {}: {}",
                    path.display(),
                    temporary.display(),
                    e
                );
                outcome.failures += 1;
                continue;
            }
        }

        // Link
        if !dry_run {
            if let Err(e) = fs::hard_link(&source.path, &path) {
                log::error!(
                    "Failed to hardlink {} to {}: {}",
                    source.path.display(),
                    path.display(),
                    e
                );
                if let Err(e) = fs::rename(&temporary, &path) {
                    log::error!(
                        "ALERT: failed to rename {} back to {}: {} - manual intervention required",
                        temporary.display(),
                        path.display(),
                        e
                    );
                }
                outcome.failures += 1;
                continue;
            }
        }

        // Commit: release the destination's link to the old content
        if !dry_run {
            if let Err(e) = fs::remove_file(&temporary) {
                // The new link stands; only the temporary file leaked
                log::warn!(
                    "Failed to remove temporary file {}: {}",
                    temporary.display(),
                    e
                );
            }
        }

        let alias = destination
            .aliases
            .remove(&path)
            .unwrap_or_else(|| AliasEntry::discovered(destination.inode, destination.links));
        destination.links = destination.links.saturating_sub(1);

        let saved = if alias.links == 1 { source.size } else { 0 };
        log::info!(
            "{}: {}\n    to: {}\n        saving {}",
            if dry_run { "Dry run" } else { " Linked" },
            source.path.display(),
            path.display(),
            ByteSize::b(saved)
        );

        if let Some(remaining) = source.absorbed.get_mut(&alias.inode) {
            *remaining = remaining.saturating_sub(1);
        }

        source.aliases.insert(
            path.clone(),
            AliasEntry {
                inode: alias.inode,
                links: alias.links,
                new_links: alias.new_links + 1,
            },
        );
        source.links += 1;
        outcome.links_created += 1;

        reconcile_attributes(source, destination, &path, dry_run);
    }

    outcome.absorbed_all = destination.aliases.is_empty();
    outcome
}

/// Propagate the destination's owner and times onto a newly created
/// link when the destination's modification time is strictly later.
///
/// Failures are reported but never undo the link. The source's tracked
/// attributes are updated only when the on-disk change succeeded (or in
/// simulate mode, where it trivially would), so later candidate checks
/// compare against what the filesystem actually holds.
fn reconcile_attributes(
    source: &mut FileRecord,
    destination: &FileRecord,
    link_path: &Path,
    dry_run: bool,
) {
    if destination.mtime <= source.mtime {
        return;
    }

    if !dry_run {
        if let Err(e) = std::os::unix::fs::chown(
            link_path,
            Some(destination.uid),
            Some(destination.gid),
        ) {
            log::error!(
                "Failed to update owner of {}: {}",
                link_path.display(),
                e
            );
            return;
        }
        if let Err(e) = filetime::set_file_times(
            link_path,
            destination.atime.to_filetime(),
            destination.mtime.to_filetime(),
        ) {
            log::error!(
                "Failed to update times of {}: {}",
                link_path.display(),
                e
            );
            return;
        }
    }

    source.mtime = destination.mtime;
    source.atime = destination.atime;
    source.uid = destination.uid;
    source.gid = destination.gid;
}

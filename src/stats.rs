//! Statistics over the finished index, and the textual reports.
//!
//! # Overview
//!
//! The statistics engine is a pure tally over the index's alias tables:
//! how many fingerprints, inodes and files are tracked, how many links
//! and bytes existed before the run, and how many links and bytes this
//! run added. Because the merge engine keeps its bookkeeping identical
//! whether or not the filesystem was actually mutated, the same tally
//! serves real and simulated runs; `dry_run` only marks the rendered
//! report.
//!
//! Savings accounting per alias: `new_links` links were created against
//! the path this run, each worth the record's size; the canonical path
//! (the first reference) never counts. A created link is *added* when
//! the destination path's original inode was previously unlinked and
//! *updated* when it already belonged to a multi-link group.

use std::fmt::Write as _;
use std::time::Duration;

use bytesize::ByteSize;

use crate::index::FingerprintIndex;

/// Aggregate counters computed from the final index state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Number of fingerprint buckets.
    pub fingerprints: u64,
    /// Number of tracked inodes (records).
    pub inodes: u64,
    /// Number of tracked file paths.
    pub files: u64,
    /// Paths that already belonged to a multi-link group before the run.
    pub already_links: u64,
    /// Bytes attributable to pre-existing links (one copy per inode
    /// group does not count).
    pub already_bytes: u64,
    /// Links created onto previously-unlinked files this run.
    pub added_links: u64,
    /// Links created onto already-multi-linked inodes this run.
    pub updated_links: u64,
    /// Bytes saved by links created this run.
    pub saved_bytes: u64,
    /// Whether the run was simulate-only.
    pub dry_run: bool,
}

impl Statistics {
    /// Tally the finished index.
    ///
    /// `dry_run` does not change any number — merge bookkeeping already
    /// projects link counts so simulated and real runs agree — it only
    /// marks the report as simulated.
    #[must_use]
    pub fn compute(index: &FingerprintIndex, dry_run: bool) -> Self {
        let mut stats = Self {
            fingerprints: index.fingerprint_count() as u64,
            dry_run,
            ..Default::default()
        };

        for record in index.records() {
            stats.inodes += 1;
            let mut already_in_group: u64 = 0;

            for alias in record.aliases.values() {
                stats.files += 1;

                if alias.new_links > 0 {
                    stats.saved_bytes += record.size * alias.new_links;
                    if alias.links > 1 {
                        stats.updated_links += alias.new_links;
                    } else {
                        stats.added_links += alias.new_links;
                    }
                }

                if alias.links > 1 {
                    stats.already_links += 1;
                    already_in_group += 1;
                }
            }

            // One member of each pre-existing group holds the real copy
            if already_in_group > 0 {
                stats.already_bytes += record.size * (already_in_group - 1);
            }
        }

        stats
    }

    /// Render the statistics block.
    #[must_use]
    pub fn render(&self, elapsed: Duration, skipped: u64) -> String {
        let mut out = String::from("\nSTATISTICS\n\n");
        let _ = writeln!(out, "Inodes:         {}", self.inodes);
        let _ = writeln!(out, "Files:          {}", self.files);
        let _ = writeln!(out, "Fingerprints:   {}", self.fingerprints);
        let _ = writeln!(out, "Already Linked: {}", self.already_links);
        let _ = writeln!(
            out,
            "Saved Already:  {}",
            ByteSize::b(self.already_bytes)
        );
        let _ = writeln!(out, "Updated Links:  {}", self.updated_links);
        let _ = writeln!(out, "Added Links:    {}", self.added_links);
        let _ = writeln!(
            out,
            "Saved Bytes:    {}",
            ByteSize::b(self.saved_bytes)
        );
        if skipped > 0 {
            let _ = writeln!(out, "Skipped:        {}", skipped);
        }
        let _ = writeln!(out, "Run Time:       {:.3}s", elapsed.as_secs_f64());
        if self.dry_run {
            out.push_str("\nDRY RUN ONLY: No files were changed.\n");
        }
        out
    }
}

/// Report of files that were already hard-linked before this run,
/// grouped by inode.
#[must_use]
pub fn report_already_linked(index: &FingerprintIndex) -> String {
    let mut out = String::from("\nALREADY HARDLINKED");
    for record in index.records() {
        let paths = record.already_linked_paths();
        if paths.len() < 2 {
            continue;
        }
        let _ = write!(
            out,
            "\n\nInode {} ({}) Linked:",
            record.inode,
            ByteSize::b(record.size)
        );
        for path in paths {
            let _ = write!(out, "\n   {}", path.display());
        }
    }
    out
}

/// Report of files newly linked during this run, grouped by inode.
///
/// Destinations that were previously unlinked are marked `+`; ones
/// merged out of a pre-existing multi-link group are marked `*`.
#[must_use]
pub fn report_new_links(index: &FingerprintIndex) -> String {
    let mut out = String::from("\nHARDLINKED");
    for record in index.records() {
        if !record.has_new_links() {
            continue;
        }
        let _ = write!(
            out,
            "\n\nInode {} ({}) Linked:\n     {}",
            record.inode,
            ByteSize::b(record.size),
            record.path.display()
        );
        for (path, alias) in &record.aliases {
            if alias.new_links == 0 {
                continue;
            }
            let marker = if alias.links > 1 { '*' } else { '+' };
            let _ = write!(out, "\n   {} {}", marker, path.display());
        }
    }
    out
}

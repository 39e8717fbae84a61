//! The deduplication engine: scan, route, compare, merge.
//!
//! # Overview
//!
//! [`Deduper`] drives the pipeline strictly sequentially: each file
//! observation from the walker is routed through the fingerprint index
//! before the next one is looked at. Routing follows the
//! insert-or-route contract:
//!
//! - unseen fingerprint → new bucket with a new record;
//! - known `(device, inode)` → the path is a new alias of a known inode;
//! - otherwise a first-fit candidate search over the bucket, gated by
//!   the match policy, the confirmation capability and the byte-exact
//!   comparator; a confirmed pair is handed to the merge engine and the
//!   index updated in the same step;
//! - no candidate → a new record in the existing bucket.
//!
//! Per-file failures are counted and logged, never fatal: the run always
//! visits everything it can.

use std::time::{Duration, Instant};

use crate::compare::Comparator;
use crate::config::Settings;
use crate::confirm::Confirm;
use crate::index::{FileRecord, FingerprintIndex, MatchPolicy};
use crate::linker;
use crate::scanner::{self, FileObservation, ScanFilter, Walker};

/// Counters describing one completed run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    /// Files that entered the index (passed every filter).
    pub files_seen: u64,
    /// Hard links created (or simulated) by merges.
    pub links_created: u64,
    /// Candidate merges refused at the confirmation prompt.
    pub skipped: u64,
    /// Directories or entries that could not be read.
    pub scan_errors: u64,
    /// Aliases left unmerged after a vacate/link failure.
    pub merge_failures: u64,
    /// Wall-clock duration of the scan.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether any non-fatal error occurred during the run.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.scan_errors > 0 || self.merge_failures > 0
    }
}

/// The matching-and-merging engine.
pub struct Deduper {
    settings: Settings,
    policy: MatchPolicy,
    comparator: Comparator,
    index: FingerprintIndex,
    maximum_links: u64,
    summary: RunSummary,
}

impl Deduper {
    /// Create an engine over validated settings and a (possibly
    /// pre-loaded) index.
    #[must_use]
    pub fn new(settings: Settings, index: FingerprintIndex) -> Self {
        let policy = settings.match_policy();
        let comparator = Comparator::new(settings.no_confirm);
        let maximum_links = settings
            .directories
            .first()
            .map_or(scanner::DEFAULT_MAXIMUM_LINKS, |d| scanner::maximum_links(d));
        Self {
            settings,
            policy,
            comparator,
            index,
            maximum_links,
            summary: RunSummary::default(),
        }
    }

    /// The index in its current state.
    #[must_use]
    pub fn index(&self) -> &FingerprintIndex {
        &self.index
    }

    /// Consume the engine, yielding the final index.
    #[must_use]
    pub fn into_index(self) -> FingerprintIndex {
        self.index
    }

    /// Scan all configured directories to completion.
    pub fn run(&mut self, confirm: &mut dyn Confirm) -> RunSummary {
        let start = Instant::now();
        let filter = ScanFilter {
            min_size: self.settings.min_size,
            max_size: self.settings.max_size,
            exclude: self.settings.exclude.clone(),
            match_pattern: self.settings.match_pattern.clone(),
            maximum_links: self.maximum_links,
            skip_paths: self.settings.store_path.iter().cloned().collect(),
        };
        let walker = Walker::new(self.settings.directories.clone(), filter);

        for item in walker {
            match item {
                Ok(observation) => self.route(observation, confirm),
                Err(e) => {
                    log::error!("{}", e);
                    self.summary.scan_errors += 1;
                }
            }
        }

        self.summary.elapsed = start.elapsed();
        self.summary
    }

    /// Route one observation through the index.
    fn route(&mut self, observation: FileObservation, confirm: &mut dyn Confirm) {
        self.summary.files_seen += 1;
        let fingerprint = self.policy.fingerprint(&observation);
        let key = (observation.device, observation.inode);

        if self.index.bucket(&fingerprint).is_none() {
            self.index
                .insert(fingerprint, FileRecord::from_observation(&observation));
            return;
        }

        // A known inode: merely a new alias
        if let Some(record) = self.index.record_mut(&fingerprint, key) {
            log::debug!(
                "New alias of inode {}: {}",
                observation.inode,
                observation.path.display()
            );
            record.record_alias(&observation);
            return;
        }

        // First-fit candidate search
        let candidate_keys: Vec<(u64, u64)> = self
            .index
            .bucket(&fingerprint)
            .map(|bucket| bucket.keys().copied().collect())
            .unwrap_or_default();
        for candidate_key in candidate_keys {
            let Some(record) = self
                .index
                .bucket(&fingerprint)
                .and_then(|b| b.get(&candidate_key))
            else {
                continue;
            };
            if !self
                .policy
                .is_candidate(record, &observation, self.maximum_links)
            {
                continue;
            }

            if !confirm.confirm_merge(&record.path, &observation.path) {
                log::info!(
                    "Skipped: {} would link to {}",
                    observation.path.display(),
                    record.path.display()
                );
                self.summary.skipped += 1;
                continue;
            }

            if !self.comparator.equal(record, &observation) {
                continue;
            }

            self.merge_pair(fingerprint, candidate_key, &observation);
            return;
        }

        // Nothing qualified: a new inode in an existing bucket
        self.index
            .insert(fingerprint, FileRecord::from_observation(&observation));
    }

    /// Merge a confirmed-equal observation with a known record and put
    /// the results back into the index.
    fn merge_pair(
        &mut self,
        fingerprint: crate::index::Fingerprint,
        known_key: (u64, u64),
        observation: &FileObservation,
    ) {
        let Some(known) = self.index.remove(&fingerprint, known_key) else {
            return;
        };
        let mut candidate = FileRecord::from_observation(observation);

        // A re-encounter of an inode already merged this run means the
        // observed link count is stale (the disk was not mutated);
        // substitute the projected value so original-link accounting is
        // not double counted.
        if known.inodes.contains(&candidate.inode) {
            if let Some(&projected) = known.absorbed.get(&candidate.inode) {
                log::debug!(
                    "Projecting links of re-encountered inode {}: {} -> {}",
                    candidate.inode,
                    candidate.links,
                    projected
                );
                candidate.links = projected;
                if let Some(alias) = candidate.aliases.get_mut(&candidate.path) {
                    alias.links = projected;
                }
            }
        }

        // The record with more links survives; ties keep the known one
        let (mut source, mut destination) = if candidate.links > known.links {
            log::debug!(
                "Keeping candidate inode {} ({} links) over known inode {} ({} links)",
                candidate.inode,
                candidate.links,
                known.inode,
                known.links
            );
            (candidate, known)
        } else {
            (known, candidate)
        };

        let outcome = linker::merge(&mut source, &mut destination, self.settings.dry_run);
        self.summary.links_created += outcome.links_created;
        self.summary.merge_failures += outcome.failures;

        if !outcome.absorbed_all {
            // Partial absorption: the destination keeps what is left
            self.index.insert(fingerprint, destination);
        }
        self.index.insert(fingerprint, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AssumeYes;
    use std::fs::{self, File};
    use std::io::Write;
    use std::os::unix::fs::MetadataExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn create(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap().write_all(contents).unwrap();
        path
    }

    fn settings_for(dir: &TempDir) -> Settings {
        Settings {
            directories: vec![dir.path().to_path_buf()],
            ..Default::default()
        }
    }

    fn inode(path: &Path) -> u64 {
        fs::metadata(path).unwrap().ino()
    }

    /// Pops pre-recorded answers; refuses once exhausted.
    struct Scripted(Vec<bool>);

    impl Confirm for Scripted {
        fn confirm_merge(&mut self, _keep: &Path, _link: &Path) -> bool {
            self.0.pop().unwrap_or(false)
        }
    }

    #[test]
    fn test_equal_files_converge() {
        let dir = TempDir::new().unwrap();
        let a = create(&dir, "a/one.txt", b"same bytes here");
        let b = create(&dir, "b/two.txt", b"same bytes here");

        let mut engine = Deduper::new(settings_for(&dir), FingerprintIndex::new());
        let summary = engine.run(&mut AssumeYes);

        assert_eq!(summary.files_seen, 2);
        assert_eq!(summary.links_created, 1);
        assert_eq!(inode(&a), inode(&b));
        assert_eq!(engine.index().record_count(), 1);
    }

    #[test]
    fn test_different_content_never_merges() {
        let dir = TempDir::new().unwrap();
        let a = create(&dir, "one.txt", b"same length AAAA");
        let b = create(&dir, "two.txt", b"same length BBBB");

        let mut engine = Deduper::new(settings_for(&dir), FingerprintIndex::new());
        let summary = engine.run(&mut AssumeYes);

        assert_eq!(summary.links_created, 0);
        assert_ne!(inode(&a), inode(&b));
        assert_eq!(engine.index().record_count(), 2);
    }

    #[test]
    fn test_known_inode_becomes_alias() {
        let dir = TempDir::new().unwrap();
        let a = create(&dir, "one.txt", b"linked already");
        let b = dir.path().join("two.txt");
        fs::hard_link(&a, &b).unwrap();

        let mut engine = Deduper::new(settings_for(&dir), FingerprintIndex::new());
        let summary = engine.run(&mut AssumeYes);

        assert_eq!(summary.links_created, 0);
        assert_eq!(engine.index().record_count(), 1);
        let record = engine.index().records().next().unwrap();
        assert_eq!(record.aliases.len(), 2);
    }

    #[test]
    fn test_refused_merge_is_counted_and_skipped() {
        let dir = TempDir::new().unwrap();
        let a = create(&dir, "one.txt", b"same bytes here");
        let b = create(&dir, "two.txt", b"same bytes here");

        let mut engine = Deduper::new(settings_for(&dir), FingerprintIndex::new());
        let mut confirm = Scripted(vec![false]);
        let summary = engine.run(&mut confirm);

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.links_created, 0);
        assert_ne!(inode(&a), inode(&b));
    }

    #[test]
    fn test_more_linked_inode_survives() {
        let dir = TempDir::new().unwrap();
        // "cluster": five links to one inode, one separate identical file
        let single = create(&dir, "a_single.txt", b"cluster contents");
        let first = create(&dir, "b_one.txt", b"cluster contents");
        for name in ["c_two.txt", "d_three.txt", "e_four.txt", "f_five.txt"] {
            fs::hard_link(&first, dir.path().join(name)).unwrap();
        }
        let cluster_inode = inode(&first);

        let mut engine = Deduper::new(settings_for(&dir), FingerprintIndex::new());
        engine.run(&mut AssumeYes);

        // All six paths resolve to the cluster's inode
        assert_eq!(inode(&single), cluster_inode);
        assert_eq!(fs::metadata(&first).unwrap().nlink(), 6);
        let record = engine.index().records().next().unwrap();
        assert_eq!(record.inode, cluster_inode);
        assert_eq!(record.aliases.len(), 6);
    }

    #[test]
    fn test_name_matching_narrows() {
        let dir = TempDir::new().unwrap();
        let a = create(&dir, "x/name.ext", b"identical stuff");
        let b = create(&dir, "y/name.ext", b"identical stuff");
        let c = create(&dir, "z/other.ext", b"identical stuff");

        let mut settings = settings_for(&dir);
        settings.same_name = true;
        let mut engine = Deduper::new(settings, FingerprintIndex::new());
        engine.run(&mut AssumeYes);

        assert_eq!(inode(&a), inode(&b));
        assert_ne!(inode(&a), inode(&c));
    }

    #[test]
    fn test_dry_run_changes_nothing_but_counts() {
        let dir = TempDir::new().unwrap();
        let a = create(&dir, "one.txt", b"same bytes here");
        let b = create(&dir, "two.txt", b"same bytes here");

        let mut settings = settings_for(&dir);
        settings.dry_run = true;
        let mut engine = Deduper::new(settings, FingerprintIndex::new());
        let summary = engine.run(&mut AssumeYes);

        assert_eq!(summary.links_created, 1);
        assert_ne!(inode(&a), inode(&b));
        assert_eq!(fs::metadata(&a).unwrap().nlink(), 1);
    }

    #[test]
    fn test_listing_error_is_nonfatal() {
        let dir = TempDir::new().unwrap();
        create(&dir, "one.txt", b"contents one...");

        let mut settings = settings_for(&dir);
        settings
            .directories
            .insert(0, dir.path().join("no_such_dir"));
        let mut engine = Deduper::new(settings, FingerprintIndex::new());
        let summary = engine.run(&mut AssumeYes);

        assert_eq!(summary.scan_errors, 1);
        assert_eq!(summary.files_seen, 1);
        assert!(summary.has_errors());
    }
}

//! The fingerprint index: buckets of file records keyed by a cheap
//! signature, plus the merge-candidate predicate.

use std::collections::BTreeMap;

use super::record::FileRecord;
use crate::scanner::{FileObservation, Timestamp};

/// The cheap grouping key that bounds how many files are ever compared
/// byte-for-byte.
///
/// Size alone by default; size plus modification time when timestamp- or
/// property-matching is enabled (mode/uid/gid stay out of the key — they
/// are cheap to check in the predicate and keying on them would make the
/// matching switches irreversible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fingerprint {
    /// Keyed by file size only.
    Size(u64),
    /// Keyed by file size and modification time.
    SizeTime(u64, Timestamp),
}

/// Which optional equality checks a merge candidate must pass.
///
/// Every switch only narrows the candidate set; same-device is not a
/// switch because hard links cannot cross devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPolicy {
    /// Filenames must be identical.
    pub same_name: bool,
    /// Modification times must be identical.
    pub same_timestamp: bool,
    /// Mode, uid and gid must be identical.
    pub same_properties: bool,
}

impl MatchPolicy {
    /// Compute the fingerprint of an observation under this policy.
    #[must_use]
    pub fn fingerprint(&self, observation: &FileObservation) -> Fingerprint {
        if self.same_timestamp || self.same_properties {
            Fingerprint::SizeTime(observation.size, observation.mtime)
        } else {
            Fingerprint::Size(observation.size)
        }
    }

    /// The fingerprint a record's own attributes produce.
    ///
    /// Used to rebuild buckets when loading a persisted index, so a
    /// saved index can seed a run with different matching switches.
    #[must_use]
    pub fn record_fingerprint(&self, record: &FileRecord) -> Fingerprint {
        if self.same_timestamp || self.same_properties {
            Fingerprint::SizeTime(record.size, record.mtime)
        } else {
            Fingerprint::Size(record.size)
        }
    }

    /// The merge-candidate predicate: whether `record` is worth a
    /// byte-for-byte comparison against `observation`.
    ///
    /// All conditions must hold: different inode, same device (always),
    /// record still below the hardlink limit, and whichever of the
    /// name/property/timestamp checks are enabled.
    #[must_use]
    pub fn is_candidate(
        &self,
        record: &FileRecord,
        observation: &FileObservation,
        maximum_links: u64,
    ) -> bool {
        record.inode != observation.inode
            && record.device == observation.device
            && record.links < maximum_links
            && (!self.same_name || record.file_name() == observation.file_name())
            && (!self.same_properties
                || (record.mode == observation.mode
                    && record.uid == observation.uid
                    && record.gid == observation.gid))
            && (!self.same_timestamp || record.mtime == observation.mtime)
    }
}

/// A bucket of records sharing one fingerprint, keyed by (device, inode).
pub type Bucket = BTreeMap<(u64, u64), FileRecord>;

/// Mapping from fingerprint to records, the central data structure.
///
/// Invariant: every alias path appears in exactly one record in exactly
/// one bucket at any time. Ordered maps keep candidate iteration and
/// report output deterministic across processes; beyond determinism the
/// iteration order is implementation-defined and not part of the
/// contract.
#[derive(Debug, Default, Clone)]
pub struct FingerprintIndex {
    buckets: BTreeMap<Fingerprint, Bucket>,
}

impl FingerprintIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bucket for a fingerprint, if any file with it has been seen.
    #[must_use]
    pub fn bucket(&self, fingerprint: &Fingerprint) -> Option<&Bucket> {
        self.buckets.get(fingerprint)
    }

    /// Mutable access to a record by fingerprint and (device, inode).
    pub fn record_mut(
        &mut self,
        fingerprint: &Fingerprint,
        key: (u64, u64),
    ) -> Option<&mut FileRecord> {
        self.buckets.get_mut(fingerprint)?.get_mut(&key)
    }

    /// Insert a record into its fingerprint bucket.
    ///
    /// Creates the bucket if this is the first record with the
    /// fingerprint.
    pub fn insert(&mut self, fingerprint: Fingerprint, record: FileRecord) {
        log::debug!(
            "Indexing inode {} under {:?} ({})",
            record.inode,
            fingerprint,
            record.path.display()
        );
        self.buckets
            .entry(fingerprint)
            .or_default()
            .insert(record.key(), record);
    }

    /// Remove and return a record from a bucket.
    ///
    /// Used both to take a record out for merging and to drop a fully
    /// absorbed (redundant) record.
    pub fn remove(&mut self, fingerprint: &Fingerprint, key: (u64, u64)) -> Option<FileRecord> {
        let bucket = self.buckets.get_mut(fingerprint)?;
        let removed = bucket.remove(&key);
        if bucket.is_empty() {
            self.buckets.remove(fingerprint);
        }
        removed
    }

    /// Number of fingerprint buckets.
    #[must_use]
    pub fn fingerprint_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of records across all buckets.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    /// Iterate all records in deterministic order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.buckets.values().flat_map(BTreeMap::values)
    }

    /// Iterate all records mutably.
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut FileRecord> {
        self.buckets.values_mut().flat_map(BTreeMap::values_mut)
    }

    /// Drop records without aliases and buckets without records.
    ///
    /// Records can lose all aliases when the persistent store prunes
    /// paths that vanished between runs.
    pub fn prune_empty(&mut self) {
        for bucket in self.buckets.values_mut() {
            bucket.retain(|_, record| !record.aliases.is_empty());
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn observation(path: &str, inode: u64, size: u64) -> FileObservation {
        FileObservation {
            path: PathBuf::from(path),
            device: 7,
            inode,
            size,
            links: 1,
            mtime: Timestamp::new(1_700_000_000, 0),
            atime: Timestamp::new(1_700_000_000, 0),
            mode: 0o644,
            uid: 1000,
            gid: 1000,
        }
    }

    #[test]
    fn test_fingerprint_by_size_only() {
        let policy = MatchPolicy::default();
        let a = observation("/a", 1, 100);
        let mut b = observation("/b", 2, 100);
        b.mtime = Timestamp::new(1, 0);

        assert_eq!(policy.fingerprint(&a), policy.fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_with_timestamp() {
        let policy = MatchPolicy {
            same_timestamp: true,
            ..Default::default()
        };
        let a = observation("/a", 1, 100);
        let mut b = observation("/b", 2, 100);
        b.mtime = Timestamp::new(1, 0);

        assert_ne!(policy.fingerprint(&a), policy.fingerprint(&b));
    }

    #[test]
    fn test_properties_key_on_size_and_time() {
        let policy = MatchPolicy {
            same_properties: true,
            ..Default::default()
        };
        let a = observation("/a", 1, 100);
        assert!(matches!(policy.fingerprint(&a), Fingerprint::SizeTime(..)));
    }

    #[test]
    fn test_candidate_rejects_same_inode() {
        let policy = MatchPolicy::default();
        let a = observation("/a", 1, 100);
        let record = FileRecord::from_observation(&a);

        assert!(!policy.is_candidate(&record, &observation("/b", 1, 100), u64::MAX));
        assert!(policy.is_candidate(&record, &observation("/b", 2, 100), u64::MAX));
    }

    #[test]
    fn test_candidate_rejects_cross_device() {
        let policy = MatchPolicy::default();
        let record = FileRecord::from_observation(&observation("/a", 1, 100));
        let mut other = observation("/b", 2, 100);
        other.device = 8;

        assert!(!policy.is_candidate(&record, &other, u64::MAX));
    }

    #[test]
    fn test_candidate_respects_link_limit() {
        let policy = MatchPolicy::default();
        let mut record = FileRecord::from_observation(&observation("/a", 1, 100));
        record.links = 10;

        assert!(!policy.is_candidate(&record, &observation("/b", 2, 100), 10));
        assert!(policy.is_candidate(&record, &observation("/b", 2, 100), 11));
    }

    #[test]
    fn test_candidate_name_matching() {
        let policy = MatchPolicy {
            same_name: true,
            ..Default::default()
        };
        let record = FileRecord::from_observation(&observation("/dir1/name.ext", 1, 100));

        assert!(policy.is_candidate(&record, &observation("/dir2/name.ext", 2, 100), u64::MAX));
        assert!(!policy.is_candidate(&record, &observation("/dir2/other.ext", 2, 100), u64::MAX));
    }

    #[test]
    fn test_candidate_property_matching() {
        let policy = MatchPolicy {
            same_properties: true,
            ..Default::default()
        };
        let record = FileRecord::from_observation(&observation("/a", 1, 100));

        let mut other_uid = observation("/b", 2, 100);
        other_uid.uid = 0;
        assert!(!policy.is_candidate(&record, &other_uid, u64::MAX));

        let mut other_mode = observation("/b", 2, 100);
        other_mode.mode = 0o600;
        assert!(!policy.is_candidate(&record, &other_mode, u64::MAX));

        assert!(policy.is_candidate(&record, &observation("/b", 2, 100), u64::MAX));
    }

    #[test]
    fn test_candidate_timestamp_matching() {
        let policy = MatchPolicy {
            same_timestamp: true,
            ..Default::default()
        };
        let record = FileRecord::from_observation(&observation("/a", 1, 100));

        let mut other = observation("/b", 2, 100);
        other.mtime = Timestamp::new(5, 0);
        assert!(!policy.is_candidate(&record, &other, u64::MAX));
        assert!(policy.is_candidate(&record, &observation("/b", 2, 100), u64::MAX));
    }

    #[test]
    fn test_index_insert_and_remove() {
        let mut index = FingerprintIndex::new();
        let policy = MatchPolicy::default();
        let obs = observation("/a", 1, 100);
        let fp = policy.fingerprint(&obs);

        index.insert(fp, FileRecord::from_observation(&obs));
        assert_eq!(index.fingerprint_count(), 1);
        assert_eq!(index.record_count(), 1);

        let removed = index.remove(&fp, (7, 1)).unwrap();
        assert_eq!(removed.inode, 1);
        assert_eq!(index.fingerprint_count(), 0, "empty bucket is dropped");
    }

    #[test]
    fn test_index_prune_empty() {
        let mut index = FingerprintIndex::new();
        let policy = MatchPolicy::default();
        let obs = observation("/a", 1, 100);
        let fp = policy.fingerprint(&obs);
        let mut record = FileRecord::from_observation(&obs);
        record.aliases.clear();
        index.insert(fp, record);

        index.prune_empty();
        assert_eq!(index.record_count(), 0);
        assert_eq!(index.fingerprint_count(), 0);
    }

    #[test]
    fn test_index_records_deterministic_order() {
        let mut index = FingerprintIndex::new();
        let policy = MatchPolicy::default();
        for inode in [5, 3, 9] {
            let obs = observation(&format!("/f{inode}"), inode, 100);
            index.insert(policy.fingerprint(&obs), FileRecord::from_observation(&obs));
        }

        let inodes: Vec<u64> = index.records().map(|r| r.inode).collect();
        assert_eq!(inodes, vec![3, 5, 9]);
    }
}

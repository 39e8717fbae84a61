//! Byte-exact content comparison with a same-run trust shortcut.
//!
//! Equality is never decided from metadata alone: two candidate paths
//! are read in full through buffered readers and compared chunk by
//! chunk. The one exception is the trust shortcut: in no-confirmation
//! mode, a candidate whose inode was already merged into the known
//! record earlier in the run is accepted without re-reading, because
//! that pair was physically confirmed equal when it was merged.
//!
//! A read failure is reported and treated as "not equal" — never as a
//! match, and never fatal to the run.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::index::FileRecord;
use crate::scanner::FileObservation;

const COMPARE_BUFFER_SIZE: usize = 64 * 1024;

/// Content comparator for candidate pairs.
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    /// Trust inode pairs already merged this run (no-confirmation mode).
    trust_merged: bool,
}

impl Comparator {
    /// Create a comparator.
    ///
    /// `trust_merged` enables the same-run inode shortcut and should be
    /// set exactly when no-confirmation mode is active.
    #[must_use]
    pub fn new(trust_merged: bool) -> Self {
        Self { trust_merged }
    }

    /// Whether the candidate's content equals the known record's.
    #[must_use]
    pub fn equal(&self, known: &FileRecord, candidate: &FileObservation) -> bool {
        if self.trust_merged && known.inodes.contains(&candidate.inode) {
            log::debug!(
                "Trusting inode {} already merged this run: {}",
                candidate.inode,
                candidate.path.display()
            );
            return true;
        }
        log::debug!(
            "Comparing: {}\n       to: {}",
            candidate.path.display(),
            known.path.display()
        );
        match contents_equal(&known.path, &candidate.path) {
            Ok(equal) => equal,
            Err(e) => {
                log::warn!(
                    "Comparison failed for {} vs {}: {}",
                    known.path.display(),
                    candidate.path.display(),
                    e
                );
                false
            }
        }
    }
}

/// Full byte-for-byte comparison of two files.
pub fn contents_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let mut reader_a = BufReader::with_capacity(COMPARE_BUFFER_SIZE, File::open(a)?);
    let mut reader_b = BufReader::with_capacity(COMPARE_BUFFER_SIZE, File::open(b)?);

    let mut buf_a = vec![0u8; COMPARE_BUFFER_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BUFFER_SIZE];

    loop {
        let read_a = read_full(&mut reader_a, &mut buf_a)?;
        let read_b = read_full(&mut reader_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Read until the buffer is full or the stream ends.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

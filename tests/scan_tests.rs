//! End-to-end scan scenarios over real temporary trees.
//!
//! The fixture mirrors the classic tree: five directories holding a mix
//! of identical and nearly identical files, one pre-existing hardlink,
//! and one file with an older modification time.

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use hardlinker::config::Settings;
use hardlinker::confirm::AssumeYes;
use hardlinker::engine::Deduper;
use hardlinker::index::FingerprintIndex;
use tempfile::TempDir;

fn data1() -> Vec<u8> {
    b"abcdefghijklmnopqrstuvwxyz".repeat(1024)
}

fn data2() -> Vec<u8> {
    let mut data = data1();
    *data.last_mut().unwrap() = b'2';
    data
}

fn write_file(root: &Path, relative: &str, contents: &[u8], mtime_secs: i64) {
    let path = root.join(relative);
    File::create(&path).unwrap().write_all(contents).unwrap();
    let time = filetime::FileTime::from_unix_time(mtime_secs, 0);
    filetime::set_file_times(&path, time, time).unwrap();
}

fn ino(root: &Path, relative: &str) -> u64 {
    fs::metadata(root.join(relative)).unwrap().ino()
}

fn nlink(root: &Path, relative: &str) -> u64 {
    fs::metadata(root.join(relative)).unwrap().nlink()
}

/// dir1..dir5 with identical content spread across names, one
/// pre-existing hardlink, and dir4/name1.ext two seconds older.
fn create_tree() -> (TempDir, Vec<(PathBuf, Vec<u8>)>) {
    let root = TempDir::new().unwrap();
    let now = 1_700_000_000;
    for directory in ["dir1", "dir2", "dir3", "dir4", "dir5"] {
        fs::create_dir(root.path().join(directory)).unwrap();
    }
    let files = [
        ("dir1/name1.ext", data1(), now),
        ("dir1/name2.ext", data1(), now),
        ("dir1/name3.ext", data2(), now),
        ("dir2/name1.ext", data1(), now),
        ("dir3/name1.ext", data2(), now),
        ("dir3/name1.noext", data1(), now),
        ("dir4/name1.ext", data1(), now - 2),
    ];
    let mut expected = Vec::new();
    for (relative, contents, mtime) in files {
        write_file(root.path(), relative, &contents, mtime);
        expected.push((root.path().join(relative), contents));
    }
    fs::hard_link(root.path().join("dir1/name1.ext"), root.path().join("dir1/zlink")).unwrap();
    (root, expected)
}

fn verify_contents(expected: &[(PathBuf, Vec<u8>)]) {
    for (path, contents) in expected {
        assert_eq!(&fs::read(path).unwrap(), contents, "{}", path.display());
    }
}

fn scan(root: &Path, configure: impl FnOnce(&mut Settings)) {
    let mut settings = Settings {
        directories: vec![root.to_path_buf()],
        ..Default::default()
    };
    configure(&mut settings);
    let mut engine = Deduper::new(settings, FingerprintIndex::new());
    engine.run(&mut AssumeYes);
}

#[test]
fn test_scan_tree_default() {
    let (root, expected) = create_tree();
    scan(root.path(), |_| {});
    verify_contents(&expected);

    let root = root.path();
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir1/name2.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir2/name1.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir3/name1.noext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir4/name1.ext"));
    assert_eq!(ino(root, "dir1/name3.ext"), ino(root, "dir3/name1.ext"));
    assert_ne!(ino(root, "dir1/name1.ext"), ino(root, "dir1/name3.ext"));
}

#[test]
fn test_scan_tree_dry_run() {
    let (root, expected) = create_tree();
    scan(root.path(), |s| s.dry_run = true);
    verify_contents(&expected);

    let root = root.path();
    assert_eq!(nlink(root, "dir1/name1.ext"), 2, "existing link untouched");
    assert_eq!(nlink(root, "dir1/name2.ext"), 1);
    assert_eq!(nlink(root, "dir1/name3.ext"), 1);
    assert_eq!(nlink(root, "dir2/name1.ext"), 1);
    assert_eq!(nlink(root, "dir3/name1.ext"), 1);
    assert_eq!(nlink(root, "dir3/name1.noext"), 1);
    assert_eq!(nlink(root, "dir4/name1.ext"), 1);
}

#[test]
fn test_scan_tree_filenames_equal() {
    let (root, expected) = create_tree();
    scan(root.path(), |s| s.same_name = true);
    verify_contents(&expected);

    let root = root.path();
    assert_ne!(ino(root, "dir1/name1.ext"), ino(root, "dir1/name2.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir2/name1.ext"));
    assert_ne!(ino(root, "dir1/name1.ext"), ino(root, "dir3/name1.noext"));
    assert_ne!(ino(root, "dir1/name3.ext"), ino(root, "dir3/name1.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir4/name1.ext"));
}

#[test]
fn test_scan_tree_exclude() {
    let (root, expected) = create_tree();
    scan(root.path(), |s| {
        s.exclude = vec![regex::Regex::new(r".*noext$").unwrap()];
    });
    verify_contents(&expected);

    let root = root.path();
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir1/name2.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir2/name1.ext"));
    assert_ne!(ino(root, "dir1/name1.ext"), ino(root, "dir3/name1.noext"));
    assert_eq!(ino(root, "dir1/name3.ext"), ino(root, "dir3/name1.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir4/name1.ext"));
}

#[test]
fn test_scan_tree_timestamp() {
    let (root, expected) = create_tree();
    scan(root.path(), |s| s.same_timestamp = true);
    verify_contents(&expected);

    let root = root.path();
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir1/name2.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir2/name1.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir3/name1.noext"));
    assert_eq!(ino(root, "dir1/name3.ext"), ino(root, "dir3/name1.ext"));
    // Two seconds older: timestamp equality keeps it apart
    assert_ne!(ino(root, "dir1/name1.ext"), ino(root, "dir4/name1.ext"));
}

#[test]
fn test_scan_tree_match_pattern() {
    let (root, expected) = create_tree();
    scan(root.path(), |s| {
        s.match_pattern = Some(glob::Pattern::new("*.ext").unwrap());
    });
    verify_contents(&expected);

    let root = root.path();
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir1/name2.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir2/name1.ext"));
    assert_ne!(ino(root, "dir1/name1.ext"), ino(root, "dir3/name1.noext"));
    assert_eq!(ino(root, "dir1/name3.ext"), ino(root, "dir3/name1.ext"));
    assert_eq!(ino(root, "dir1/name1.ext"), ino(root, "dir4/name1.ext"));
}

#[test]
fn test_scan_tree_min_size_excludes_everything() {
    let (root, expected) = create_tree();
    scan(root.path(), |s| s.min_size = 1024 * 1024);
    verify_contents(&expected);

    let root = root.path();
    assert_ne!(ino(root, "dir1/name1.ext"), ino(root, "dir1/name2.ext"));
    assert_eq!(nlink(root, "dir1/name2.ext"), 1);
}

#[test]
fn test_scan_narrowing_flags_never_add_merges() {
    // Any matching switch may only remove merges relative to a default
    // scan, never add one.
    let (default_root, _) = create_tree();
    scan(default_root.path(), |_| {});
    let (narrowed_root, _) = create_tree();
    scan(narrowed_root.path(), |s| {
        s.same_name = true;
        s.same_timestamp = true;
        s.same_properties = true;
    });

    let pairs = [
        ("dir1/name1.ext", "dir1/name2.ext"),
        ("dir1/name1.ext", "dir2/name1.ext"),
        ("dir1/name1.ext", "dir3/name1.noext"),
        ("dir1/name1.ext", "dir4/name1.ext"),
        ("dir1/name3.ext", "dir3/name1.ext"),
    ];
    for (a, b) in pairs {
        let merged_narrowed =
            ino(narrowed_root.path(), a) == ino(narrowed_root.path(), b);
        let merged_default = ino(default_root.path(), a) == ino(default_root.path(), b);
        assert!(
            !merged_narrowed || merged_default,
            "narrowing created a merge default did not: {a} vs {b}"
        );
    }
}

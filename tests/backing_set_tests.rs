#![allow(clippy::unwrap_used, missing_docs)]

use std::ffi::OsStr;

use exposefs::backing::{BackingSet, BackingSetError, BackingSource};

#[test]
fn open_preserves_insertion_order_and_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let b = dir.path().join("b");
    let a = dir.path().join("a");
    std::fs::write(&b, b"bb").unwrap();
    std::fs::write(&a, b"aaaa").unwrap();

    let set = BackingSet::open([BackingSource::new(&b), BackingSource::new(&a)], "").unwrap();

    let names: Vec<&OsStr> = set.iter().map(|entry| entry.name()).collect();
    assert_eq!(names, [OsStr::new("b"), OsStr::new("a")]);
    assert_eq!(set.get(0).unwrap().mount_size(), 2);
    assert_eq!(set.get(1).unwrap().mount_size(), 4);
    assert_eq!(set.get(1).unwrap().path(), a.as_path());
}

#[test]
fn suffix_is_appended_to_derived_names_only() {
    let dir = tempfile::tempdir().unwrap();
    let disc = dir.path().join("sr0");
    let other = dir.path().join("sr1");
    std::fs::write(&disc, b"x").unwrap();
    std::fs::write(&other, b"y").unwrap();

    let set = BackingSet::open(
        [
            BackingSource::new(&disc),
            BackingSource::named(&other, "second"),
        ],
        ".iso",
    )
    .unwrap();

    assert_eq!(set.position(OsStr::new("sr0.iso")), Some(0));
    assert_eq!(set.position(OsStr::new("second")), Some(1));
    assert_eq!(set.position(OsStr::new("sr0")), None);
}

#[test]
fn duplicate_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("one");
    let nested = dir.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    let second = nested.join("one");
    std::fs::write(&first, b"1").unwrap();
    std::fs::write(&second, b"2").unwrap();

    let result = BackingSet::open([BackingSource::new(&first), BackingSource::new(&second)], "");

    assert!(
        matches!(result, Err(BackingSetError::DuplicateName(ref name)) if name == "one"),
        "expected DuplicateName, got {result:?}"
    );
}

#[test]
fn invalid_explicit_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file");
    std::fs::write(&path, b"1").unwrap();

    for name in ["", ".", "..", "a/b"] {
        let result = BackingSet::open([BackingSource::named(&path, name)], "");
        assert!(
            matches!(result, Err(BackingSetError::InvalidName(_))),
            "{name:?} should be rejected, got {result:?}"
        );
    }
}

#[test]
fn missing_resource_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");

    let result = BackingSet::open([BackingSource::new(&missing)], "");

    assert!(
        matches!(result, Err(BackingSetError::Open { ref path, .. }) if *path == missing),
        "expected Open error, got {result:?}"
    );
}

#[test]
fn empty_set_is_legal() {
    let set = BackingSet::open(std::iter::empty::<BackingSource>(), ".img").unwrap();
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
    assert!(BackingSet::empty().is_empty());
}

#[test]
fn probe_sees_growth_after_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("growing");
    std::fs::write(&path, b"1234").unwrap();

    let set = BackingSet::open([BackingSource::new(&path)], "").unwrap();
    std::fs::write(&path, b"12345678").unwrap();

    let entry = set.get(0).unwrap();
    assert_eq!(entry.mount_size(), 4, "mount size is recorded once");
    assert_eq!(entry.current_size(), 8, "current size is probed fresh");
}

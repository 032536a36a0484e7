#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::ffi::OsStr;

use exposefs::fs::{EntryKind, FsError, OpenFlags, ROOT_INODE, ResolvedTarget, SHARED_HANDLE};

use common::{fixture, hello, patterned};

#[test]
fn read_whole_hello_entry() {
    let fx = hello();
    let target = fx.fs.resolve("/hello");

    let data = fx.fs.io().read_bytes(target, 0, 4096).unwrap();

    assert_eq!(&data[..], b"hello, world\n");
}

#[test]
fn read_at_and_past_end_returns_nothing() {
    let fx = hello();
    let target = fx.fs.resolve("/hello");
    let mut buf = [0u8; 64];

    assert_eq!(fx.fs.io().read(target, &mut buf, 13).unwrap(), 0);
    assert_eq!(fx.fs.io().read(target, &mut buf, 14).unwrap(), 0);
    assert_eq!(fx.fs.io().read(target, &mut buf, u64::MAX).unwrap(), 0);
}

#[test]
fn read_straddling_end_is_short() {
    let fx = hello();
    let target = fx.fs.resolve("/hello");

    let data = fx.fs.io().read_bytes(target, 7, 100).unwrap();

    assert_eq!(&data[..], b"world\n");
}

#[test]
fn in_range_reads_match_backing_content() {
    let content = patterned(64 * 1024 + 17);
    let fx = fixture(&[("blob", content.as_slice())]);
    let target = fx.fs.resolve("/blob");
    let io = fx.fs.io();

    for (offset, size) in [(0usize, 1usize), (250, 3), (4095, 2), (4096, 4096), (65_000, 553)] {
        let data = io.read_bytes(target, offset as u64, size as u32).unwrap();
        assert_eq!(
            &data[..],
            &content[offset..offset + size],
            "mismatch reading {size} bytes at {offset}"
        );
    }
}

#[test]
fn reads_leave_no_cursor_state() {
    let content = patterned(1024);
    let fx = fixture(&[("blob", content.as_slice())]);
    let target = fx.fs.resolve("/blob");
    let io = fx.fs.io();

    let tail = io.read_bytes(target, 1000, 24).unwrap();
    let head = io.read_bytes(target, 0, 24).unwrap();
    let tail_again = io.read_bytes(target, 1000, 24).unwrap();

    assert_eq!(&head[..], &content[..24]);
    assert_eq!(tail, tail_again);
}

#[test]
fn zero_length_read_is_empty() {
    let fx = hello();
    let data = fx.fs.io().read_bytes(fx.fs.resolve("/hello"), 0, 0).unwrap();
    assert!(data.is_empty());
}

#[test]
fn reading_root_is_a_directory_error() {
    let fx = hello();
    let mut buf = [0u8; 8];
    let result = fx.fs.io().read(ResolvedTarget::Root, &mut buf, 0);
    assert!(matches!(result, Err(FsError::IsADirectory)), "got {result:?}");
}

#[test]
fn reading_unknown_target_is_not_found() {
    let fx = hello();
    let mut buf = [0u8; 8];
    let result = fx.fs.io().read(ResolvedTarget::NotFound, &mut buf, 0);
    assert!(matches!(result, Err(FsError::NotFound)), "got {result:?}");

    let out_of_range = fx.fs.io().read(ResolvedTarget::Entry(5), &mut buf, 0);
    assert!(matches!(out_of_range, Err(FsError::NotFound)), "got {out_of_range:?}");
}

#[test]
fn listing_yields_dots_then_entries_in_order() {
    let fx = fixture(&[("zeta", b"z"), ("alpha", b"a"), ("mid", b"m")]);

    let listing = fx.fs.io().list_directory(ResolvedTarget::Root).unwrap();

    let names: Vec<&OsStr> = listing.iter().map(|e| e.name.as_os_str()).collect();
    assert_eq!(names, [".", "..", "zeta", "alpha", "mid"].map(OsStr::new));

    assert_eq!(listing[0].ino, ROOT_INODE);
    assert_eq!(listing[1].ino, ROOT_INODE);
    assert!(listing[..2].iter().all(|e| e.kind == EntryKind::Directory));
    assert!(listing[2..].iter().all(|e| e.kind == EntryKind::RegularFile));
    assert_eq!(
        listing[2..].iter().map(|e| e.ino).collect::<Vec<_>>(),
        vec![2, 3, 4]
    );
}

#[test]
fn listing_restarts_from_the_beginning() {
    let fx = fixture(&[("one", b"1"), ("two", b"2")]);
    let io = fx.fs.io();

    let first = io.list_directory(ResolvedTarget::Root).unwrap();
    let second = io.list_directory(ResolvedTarget::Root).unwrap();

    assert_eq!(first, second);
}

#[test]
fn listing_resumes_from_every_offset() {
    let fx = fixture(&[("zeta", b"z"), ("alpha", b"a"), ("mid", b"m")]);
    let io = fx.fs.io();
    let full = io.list_directory(ResolvedTarget::Root).unwrap();
    assert_eq!(full.len(), 5);

    for offset in 0..=full.len() {
        let resumed = io
            .list_directory_from(ResolvedTarget::Root, offset as u64)
            .unwrap();

        let entries: Vec<_> = resumed.iter().map(|(_, e)| e.clone()).collect();
        assert_eq!(entries, full[offset..], "resuming at {offset}");

        // Each item hands back the offset that continues right after it.
        for (position, (next, _)) in resumed.iter().enumerate() {
            assert_eq!(*next, (offset + position + 1) as u64);
        }
        if let Some((last, _)) = resumed.last() {
            assert_eq!(*last, full.len() as u64);
        }
    }

    assert!(io.list_directory_from(ResolvedTarget::Root, 6).unwrap().is_empty());
    assert!(io.list_directory_from(ResolvedTarget::Root, u64::MAX).unwrap().is_empty());
}

#[test]
fn resuming_an_empty_listing() {
    let fx = fixture(&[]);
    let io = fx.fs.io();

    assert_eq!(io.list_directory_from(ResolvedTarget::Root, 0).unwrap().len(), 2);
    assert_eq!(io.list_directory_from(ResolvedTarget::Root, 1).unwrap().len(), 1);
    assert!(io.list_directory_from(ResolvedTarget::Root, 2).unwrap().is_empty());

    let missing = io.list_directory_from(ResolvedTarget::NotFound, 0);
    assert!(matches!(missing, Err(FsError::NotFound)), "got {missing:?}");
}

#[test]
fn empty_set_lists_only_dots() {
    let fx = fixture(&[]);
    let listing = fx.fs.io().list_directory(ResolvedTarget::Root).unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].name, ".");
    assert_eq!(listing[1].name, "..");
}

#[test]
fn listing_an_entry_is_not_a_directory() {
    let fx = hello();
    let result = fx.fs.io().list_directory(ResolvedTarget::Entry(0));
    assert!(matches!(result, Err(FsError::NotADirectory)), "got {result:?}");

    let missing = fx.fs.io().list_directory(ResolvedTarget::NotFound);
    assert!(matches!(missing, Err(FsError::NotFound)), "got {missing:?}");
}

#[test]
fn open_grants_the_shared_handle() {
    let fx = hello();
    let io = fx.fs.io();
    let entry = fx.fs.resolve("/hello");

    assert_eq!(io.open(entry, OpenFlags::RDONLY).unwrap(), SHARED_HANDLE);
    assert_eq!(io.open(entry, OpenFlags::RDONLY).unwrap(), SHARED_HANDLE);
    assert_eq!(io.open(ResolvedTarget::Root, OpenFlags::RDONLY).unwrap(), SHARED_HANDLE);
}

#[test]
fn write_open_of_entry_is_granted_but_root_is_refused() {
    let fx = hello();
    let io = fx.fs.io();

    assert_eq!(io.open(fx.fs.resolve("/hello"), OpenFlags::RDWR).unwrap(), SHARED_HANDLE);

    let root = io.open(ResolvedTarget::Root, OpenFlags::WRONLY);
    assert!(matches!(root, Err(FsError::IsADirectory)), "got {root:?}");
}

#[test]
fn open_of_unknown_name_is_not_found() {
    let fx = hello();
    let result = fx.fs.io().open(fx.fs.resolve("/nope"), OpenFlags::RDONLY);
    assert!(matches!(result, Err(FsError::NotFound)), "got {result:?}");
}

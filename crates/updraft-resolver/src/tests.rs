use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use updraft_core::{ReleaseEntry, UpdateError};

use super::*;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "updraft-resolver-test-{}-{nanos}-{seq}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

fn build_package(path: &Path, files: &[(&str, &[u8])]) -> ReleaseEntry {
    let entries = files
        .iter()
        .map(|(name, payload)| {
            let file = if name.ends_with(".exe") {
                PackageFile::executable(payload.to_vec())
            } else {
                PackageFile::new(payload.to_vec())
            };
            (name.to_string(), file)
        })
        .collect::<PackageEntries>();
    write_package_entries(path, &entries).expect("must write package");
    ReleaseEntry::from_package_file(path).expect("must index package")
}

fn fake_entry(filename: &str) -> ReleaseEntry {
    ReleaseEntry::new("ab".repeat(32), filename, 1).expect("entry must build")
}

#[test]
fn package_writer_is_deterministic_and_readable() {
    let dir = test_dir();
    let files: &[(&str, &[u8])] = &[
        ("package.toml", b"id = \"app\"\nversion = \"1.0.0\"\n"),
        ("lib/net45/app.exe", b"binary"),
    ];
    let first = build_package(&dir.join("a-1.0.0-full.nupkg"), files);
    let second = build_package(&dir.join("b-1.0.0-full.nupkg"), files);
    assert_eq!(first.sha256, second.sha256);

    let entries = read_package_entries(&dir.join("a-1.0.0-full.nupkg")).expect("must read");
    assert_eq!(
        entries.get("lib/net45/app.exe").map(|file| file.data.as_slice()),
        Some(&b"binary"[..])
    );
    assert_eq!(
        entries.get("lib/net45/app.exe").map(|file| file.mode),
        Some(EXECUTABLE_FILE_MODE)
    );
    assert_eq!(
        entries.get("package.toml").map(|file| file.mode),
        Some(DEFAULT_FILE_MODE)
    );
    assert!(!dir.join("a-1.0.0-full.partial").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn delta_chain_rebuilds_byte_identical_full_package() {
    let cache = test_dir();
    let staging = test_dir();

    let v1_files: &[(&str, &[u8])] = &[
        ("package.toml", b"id = \"app\"\nversion = \"1.0.0\"\n"),
        ("lib/net45/app.exe", b"app build one with a fairly long common prefix"),
        ("lib/net45/legacy.dll", b"dropped in 1.1.0"),
        ("lib/net45/readme.txt", b"unchanged"),
    ];
    let v2_files: &[(&str, &[u8])] = &[
        ("package.toml", b"id = \"app\"\nversion = \"1.1.0\"\n"),
        ("lib/net45/app.exe", b"app build two with a fairly long common prefix"),
        ("lib/net45/readme.txt", b"unchanged"),
        ("lib/net45/plugin.dll", b"added in 1.1.0"),
    ];
    let v3_files: &[(&str, &[u8])] = &[
        ("package.toml", b"id = \"app\"\nversion = \"1.2.0\"\n"),
        ("lib/net45/app.exe", b"app build three with a fairly long common prefix"),
        ("lib/net45/readme.txt", b"unchanged"),
        ("lib/net45/plugin.dll", b"added in 1.1.0"),
    ];

    let base = build_package(&cache.join("app-1.0.0-full.nupkg"), v1_files);
    build_package(&staging.join("app-1.1.0-full.nupkg"), v2_files);
    let direct = build_package(&staging.join("app-1.2.0-full.nupkg"), v3_files);

    let builder = ZstdDeltaBuilder;
    builder
        .create_delta_package(
            &cache.join("app-1.0.0-full.nupkg"),
            &staging.join("app-1.1.0-full.nupkg"),
            &cache.join("app-1.1.0-delta.nupkg"),
        )
        .expect("must create first delta");
    builder
        .create_delta_package(
            &staging.join("app-1.1.0-full.nupkg"),
            &staging.join("app-1.2.0-full.nupkg"),
            &cache.join("app-1.2.0-delta.nupkg"),
        )
        .expect("must create second delta");

    let pending = vec![
        ReleaseEntry::from_package_file(&cache.join("app-1.1.0-delta.nupkg")).expect("index"),
        ReleaseEntry::from_package_file(&cache.join("app-1.2.0-delta.nupkg")).expect("index"),
    ];

    let resolved = resolve_delta_chain(Some(&base), &pending, &cache, &builder)
        .expect("chain must resolve")
        .expect("chain must produce a package");

    assert_eq!(resolved.filename, "app-1.2.0-full.nupkg");
    assert!(!resolved.is_delta);
    assert_eq!(resolved.sha256, direct.sha256);
    assert_eq!(
        fs::read(cache.join("app-1.2.0-full.nupkg")).expect("read rebuilt"),
        fs::read(staging.join("app-1.2.0-full.nupkg")).expect("read direct")
    );
    assert!(
        cache.join("app-1.1.0-full.nupkg").exists(),
        "intermediate full package stays in the cache"
    );

    let rebuilt = read_package_entries(&cache.join("app-1.2.0-full.nupkg")).expect("read");
    assert!(!rebuilt.contains_key("lib/net45/legacy.dll"));

    let _ = fs::remove_dir_all(&cache);
    let _ = fs::remove_dir_all(&staging);
}

#[test]
fn empty_pending_list_resolves_to_nothing() {
    let dir = test_dir();
    let resolved = resolve_delta_chain(None, &[], &dir, &ZstdDeltaBuilder).expect("empty is ok");
    assert!(resolved.is_none());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn mixed_full_and_delta_entries_are_rejected_in_either_order() {
    let dir = test_dir();
    let base = fake_entry("app-1.0.0-full.nupkg");
    let orders = [
        vec![
            fake_entry("app-1.1.0-delta.nupkg"),
            fake_entry("app-1.2.0-full.nupkg"),
        ],
        vec![
            fake_entry("app-1.1.0-full.nupkg"),
            fake_entry("app-1.2.0-delta.nupkg"),
        ],
    ];

    for pending in orders {
        let err = resolve_delta_chain(Some(&base), &pending, &dir, &ZstdDeltaBuilder)
            .expect_err("mixed batch must fail");
        assert!(matches!(
            err.downcast_ref::<UpdateError>(),
            Some(UpdateError::InvalidCombination(_))
        ));
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn all_full_entries_resolve_to_highest_version() {
    let dir = test_dir();
    let pending = vec![
        fake_entry("app-1.3.0-full.nupkg"),
        fake_entry("app-1.10.0-full.nupkg"),
        fake_entry("app-1.2.0-full.nupkg"),
    ];

    let resolved = resolve_delta_chain(None, &pending, &dir, &ZstdDeltaBuilder)
        .expect("full batch resolves")
        .expect("full batch yields an entry");
    assert_eq!(resolved.filename, "app-1.10.0-full.nupkg");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn delta_without_base_is_rejected() {
    let dir = test_dir();
    let pending = vec![fake_entry("app-1.1.0-delta.nupkg")];

    let err = resolve_delta_chain(None, &pending, &dir, &ZstdDeltaBuilder)
        .expect_err("delta without base must fail");
    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::MissingBase(_))
    ));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn delta_with_missing_base_file_is_rejected() {
    let dir = test_dir();
    let base = fake_entry("app-1.0.0-full.nupkg");
    let pending = vec![fake_entry("app-1.1.0-delta.nupkg")];

    let err = resolve_delta_chain(Some(&base), &pending, &dir, &ZstdDeltaBuilder)
        .expect_err("absent base package must fail");
    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::MissingPackage(_))
    ));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn delta_carries_unix_modes_of_the_new_package() {
    let cache = test_dir();
    let staging = test_dir();

    let mut v1 = PackageEntries::new();
    v1.insert("lib/net45/app".to_string(), PackageFile::executable(b"launcher one".to_vec()));
    v1.insert("lib/net45/tool".to_string(), PackageFile::new(b"helper".to_vec()));
    v1.insert("lib/net45/data.bin".to_string(), PackageFile::new(b"payload".to_vec()));
    let mut v2 = PackageEntries::new();
    v2.insert("lib/net45/app".to_string(), PackageFile::executable(b"launcher two".to_vec()));
    v2.insert("lib/net45/tool".to_string(), PackageFile::executable(b"helper".to_vec()));
    v2.insert("lib/net45/data.bin".to_string(), PackageFile::new(b"payload".to_vec()));
    v2.insert("lib/net45/extra".to_string(), PackageFile::executable(b"new tool".to_vec()));

    write_package_entries(&cache.join("app-1.0.0-full.nupkg"), &v1).expect("write v1");
    write_package_entries(&staging.join("app-1.1.0-full.nupkg"), &v2).expect("write v2");
    ZstdDeltaBuilder
        .create_delta_package(
            &cache.join("app-1.0.0-full.nupkg"),
            &staging.join("app-1.1.0-full.nupkg"),
            &cache.join("app-1.1.0-delta.nupkg"),
        )
        .expect("must create delta");
    ZstdDeltaBuilder
        .apply_delta(
            &cache.join("app-1.0.0-full.nupkg"),
            &cache.join("app-1.1.0-delta.nupkg"),
            &cache.join("app-1.1.0-full.nupkg"),
        )
        .expect("must apply delta");

    let rebuilt = read_package_entries(&cache.join("app-1.1.0-full.nupkg")).expect("read");
    assert_eq!(rebuilt, v2);
    assert_eq!(
        fs::read(cache.join("app-1.1.0-full.nupkg")).expect("read rebuilt"),
        fs::read(staging.join("app-1.1.0-full.nupkg")).expect("read direct")
    );

    let _ = fs::remove_dir_all(&cache);
    let _ = fs::remove_dir_all(&staging);
}

#[test]
fn rerunning_an_interrupted_chain_overwrites_stale_intermediates() {
    let cache = test_dir();
    let staging = test_dir();

    let base = build_package(
        &cache.join("app-1.0.0-full.nupkg"),
        &[("lib/net45/app.exe", b"app build one with a shared tail")],
    );
    build_package(
        &staging.join("app-1.1.0-full.nupkg"),
        &[("lib/net45/app.exe", b"app build two with a shared tail")],
    );
    let direct = build_package(
        &staging.join("app-1.2.0-full.nupkg"),
        &[("lib/net45/app.exe", b"app build three with a shared tail")],
    );
    let builder = ZstdDeltaBuilder;
    builder
        .create_delta_package(
            &cache.join("app-1.0.0-full.nupkg"),
            &staging.join("app-1.1.0-full.nupkg"),
            &cache.join("app-1.1.0-delta.nupkg"),
        )
        .expect("must create first delta");
    builder
        .create_delta_package(
            &staging.join("app-1.1.0-full.nupkg"),
            &staging.join("app-1.2.0-full.nupkg"),
            &cache.join("app-1.2.0-delta.nupkg"),
        )
        .expect("must create second delta");

    // An earlier run died after truncating the first intermediate and while
    // writing the second one.
    fs::write(cache.join("app-1.1.0-full.nupkg"), b"PK\x03\x04trunc").expect("stale intermediate");
    fs::write(cache.join("app-1.2.0-full.partial"), b"half written").expect("stale partial");

    let pending = vec![
        ReleaseEntry::from_package_file(&cache.join("app-1.1.0-delta.nupkg")).expect("index"),
        ReleaseEntry::from_package_file(&cache.join("app-1.2.0-delta.nupkg")).expect("index"),
    ];
    let resolved = resolve_delta_chain(Some(&base), &pending, &cache, &builder)
        .expect("rerun must resolve")
        .expect("rerun must produce a package");

    assert_eq!(resolved.sha256, direct.sha256);
    assert_eq!(
        fs::read(cache.join("app-1.2.0-full.nupkg")).expect("read rebuilt"),
        fs::read(staging.join("app-1.2.0-full.nupkg")).expect("read direct")
    );
    assert_eq!(
        fs::read(cache.join("app-1.1.0-full.nupkg")).expect("read intermediate"),
        fs::read(staging.join("app-1.1.0-full.nupkg")).expect("read direct intermediate")
    );
    assert!(!cache.join("app-1.2.0-full.partial").exists());

    let _ = fs::remove_dir_all(&cache);
    let _ = fs::remove_dir_all(&staging);
}

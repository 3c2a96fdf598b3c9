use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use super::*;

const HASH_A: &str = "a3f1c9d2e4b5a6978812aabbccddeeff00112233445566778899aabbccddeeff";
const HASH_B: &str = "0000000000000000000000000000000000000000000000000000000000000001";

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "updraft-core-test-{}-{nanos}-{seq}",
        std::process::id()
    ))
}

fn entry(filename: &str) -> ReleaseEntry {
    ReleaseEntry::new(HASH_A, filename, 1024).expect("entry must build")
}

#[test]
fn release_version_orders_component_wise() {
    let older = ReleaseVersion::parse("1.9.0").expect("parse");
    let newer = ReleaseVersion::parse("1.10.0").expect("parse");
    let revision = ReleaseVersion::parse("1.10.0.1").expect("parse");

    assert!(older < newer);
    assert!(newer < revision);
    assert_eq!(ReleaseVersion::parse("2").expect("parse"), ReleaseVersion::new(2, 0, 0, 0));
}

#[test]
fn release_version_display_keeps_revision_only_when_set() {
    assert_eq!(ReleaseVersion::new(1, 2, 0, 0).to_string(), "1.2.0");
    assert_eq!(ReleaseVersion::new(1, 2, 3, 4).to_string(), "1.2.3.4");
}

#[test]
fn release_version_rejects_garbage() {
    assert!(ReleaseVersion::parse("").is_err());
    assert!(ReleaseVersion::parse("1.2.x").is_err());
    assert!(ReleaseVersion::parse("1.2.3.4.5").is_err());
}

#[test]
fn release_entry_derives_version_and_delta_flag_from_filename() {
    let full = entry("My-App-1.2.0-full.nupkg");
    assert_eq!(full.version, ReleaseVersion::new(1, 2, 0, 0));
    assert!(!full.is_delta);
    assert_eq!(full.package_id(), "My-App");

    let delta = entry("My-App-1.3.0-delta.nupkg");
    assert!(delta.is_delta);
    assert_eq!(delta.full_filename(), "My-App-1.3.0-full.nupkg");
}

#[test]
fn release_entry_rejects_unknown_suffix() {
    let err = ReleaseEntry::new(HASH_A, "app-1.0.0.zip", 10).expect_err("must reject");
    assert!(err.to_string().contains("-full.nupkg"));
}

#[test]
fn release_line_round_trips_through_manifest_format() {
    let line = format!("{HASH_B} app-1.0.0-full.nupkg 2048");
    let parsed = ReleaseEntry::parse_line(&line).expect("line must parse");
    assert_eq!(parsed.size, 2048);
    assert_eq!(parsed.to_line(), line);
}

#[test]
fn release_line_rejects_short_hash() {
    assert!(ReleaseEntry::parse_line("abc app-1.0.0-full.nupkg 1").is_err());
}

#[test]
fn release_set_sorts_by_version_and_skips_comments() {
    let raw = format!(
        "# cache manifest\n{HASH_A} app-1.2.0-delta.nupkg 5\n\n{HASH_A} app-1.0.0-full.nupkg 9\n{HASH_B} app-1.2.0-full.nupkg 7\n"
    );
    let set = ReleaseSet::parse(&raw).expect("manifest must parse");
    let names = set
        .entries()
        .iter()
        .map(|entry| entry.filename.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "app-1.0.0-full.nupkg",
            "app-1.2.0-full.nupkg",
            "app-1.2.0-delta.nupkg"
        ]
    );
    assert_eq!(
        set.latest_full().map(|entry| entry.filename.as_str()),
        Some("app-1.2.0-full.nupkg")
    );
}

#[test]
fn unreadable_manifest_surfaces_typed_error() {
    let dir = test_dir();
    fs::create_dir_all(&dir).expect("must create dir");
    fs::write(manifest_path(&dir), "not a manifest line\n").expect("must write manifest");

    let err = read_release_set(&dir).expect_err("garbage manifest must fail");
    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::ManifestUnreadable(_))
    ));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_manifest_reads_as_empty_set() {
    let dir = test_dir();
    let set = read_release_set(&dir).expect("missing manifest is empty");
    assert!(set.is_empty());
}

#[test]
fn rebuild_release_set_indexes_cache_contents() {
    let dir = test_dir();
    fs::create_dir_all(&dir).expect("must create dir");
    fs::write(dir.join("app-1.0.0-full.nupkg"), b"one").expect("write package");
    fs::write(dir.join("app-1.1.0-delta.nupkg"), b"two").expect("write package");
    fs::write(dir.join("notes.txt"), b"ignored").expect("write stray file");

    let set = rebuild_release_set(&dir).expect("rebuild must succeed");
    assert_eq!(set.len(), 2);
    assert_eq!(set.entries()[0].size, 3);

    let reread = read_release_set(&dir).expect("manifest must be readable");
    assert_eq!(reread, set);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn rebuild_release_set_skips_misnamed_packages() {
    let dir = test_dir();
    fs::create_dir_all(&dir).expect("must create dir");
    fs::write(dir.join("app-1.0.0-full.nupkg"), b"one").expect("write package");
    fs::write(dir.join("app-setup.nupkg"), b"installer bundle").expect("write stray package");

    let set = rebuild_release_set(&dir).expect("misnamed package must not fail the rebuild");
    assert_eq!(set.len(), 1);
    assert_eq!(set.entries()[0].filename, "app-1.0.0-full.nupkg");
    assert!(dir.join("app-setup.nupkg").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn plan_prefers_contiguous_delta_chain() {
    let set = ReleaseSet::new(vec![
        entry("app-1.0.0-full.nupkg"),
        entry("app-1.1.0-delta.nupkg"),
        entry("app-1.1.0-full.nupkg"),
        entry("app-1.2.0-delta.nupkg"),
        entry("app-1.2.0-full.nupkg"),
    ]);
    let request = UpdateRequest::plan(Some(entry("app-1.0.0-full.nupkg")), &set, "/tmp/pkgs");

    let pending = request
        .pending
        .iter()
        .map(|entry| entry.filename.as_str())
        .collect::<Vec<_>>();
    assert_eq!(pending, vec!["app-1.1.0-delta.nupkg", "app-1.2.0-delta.nupkg"]);
    assert_eq!(
        request.target.map(|entry| entry.filename),
        Some("app-1.2.0-full.nupkg".to_string())
    );
}

#[test]
fn plan_falls_back_to_latest_full_when_chain_is_broken() {
    let set = ReleaseSet::new(vec![
        entry("app-1.0.0-full.nupkg"),
        entry("app-1.1.0-full.nupkg"),
        entry("app-1.2.0-delta.nupkg"),
        entry("app-1.2.0-full.nupkg"),
    ]);
    let request = UpdateRequest::plan(Some(entry("app-1.0.0-full.nupkg")), &set, "/tmp/pkgs");

    assert_eq!(request.pending.len(), 1);
    assert_eq!(request.pending[0].filename, "app-1.2.0-full.nupkg");
}

#[test]
fn plan_without_newer_releases_is_noop() {
    let set = ReleaseSet::new(vec![entry("app-1.0.0-full.nupkg")]);
    let request = UpdateRequest::plan(Some(entry("app-1.0.0-full.nupkg")), &set, "/tmp/pkgs");
    assert!(request.is_noop());
    assert!(request.target.is_none());
}

#[test]
fn parse_package_metadata() {
    let content = r#"
id = "SpaceApp"
version = "2.1.0"
title = "Space App"
company = "Orbit Works"
lifecycle_aware = ["SpaceApp.exe"]
updater_protocol = "1.2.0"
"#;

    let parsed = PackageMetadata::from_toml_str(content).expect("metadata should parse");
    assert_eq!(parsed.id, "SpaceApp");
    assert_eq!(
        parsed.release_version().expect("version"),
        ReleaseVersion::new(2, 1, 0, 0)
    );
    assert!(parsed.is_lifecycle_aware("spaceapp.EXE"));
    assert_eq!(
        parsed.updater_protocol.map(|v| v.to_string()).as_deref(),
        Some("1.2.0")
    );
}

#[test]
fn package_metadata_rejects_nested_lifecycle_paths() {
    let content = r#"
id = "SpaceApp"
version = "2.1.0"
lifecycle_aware = ["bin/SpaceApp.exe"]
"#;
    assert!(PackageMetadata::from_toml_str(content).is_err());
}

#[test]
fn shortcut_locations_behave_like_a_bitset() {
    let set = ShortcutLocation::Desktop | ShortcutLocation::Taskbar;
    assert!(set.contains(ShortcutLocation::Desktop));
    assert!(!set.contains(ShortcutLocation::StartMenu));
    assert_eq!(
        set.iter().collect::<Vec<_>>(),
        vec![ShortcutLocation::Desktop, ShortcutLocation::Taskbar]
    );

    let parsed = ShortcutLocations::parse_list("start-menu, desktop").expect("list parses");
    assert_eq!(parsed, ShortcutLocation::Desktop | ShortcutLocation::StartMenu);
    assert!(ShortcutLocations::parse_list("moon").is_err());
}

#[test]
fn updater_config_fills_defaults_for_missing_fields() {
    let config = UpdaterConfig::from_toml_str("hook_timeout_secs = 3\n").expect("config parses");
    assert_eq!(config.hook_timeout_secs, 3);
    assert_eq!(config.delete_retries, 10);
    assert_eq!(
        config.shortcut_locations().expect("locations"),
        ShortcutLocation::Desktop | ShortcutLocation::StartMenu
    );
}

#[test]
fn updater_config_rejects_zero_retries() {
    assert!(UpdaterConfig::from_toml_str("delete_retries = 0\n").is_err());
}

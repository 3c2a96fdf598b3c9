use super::*;
use crate::completion::write_completions_script;
use crate::dispatch::{format_doctor_lines, plan_update, resolve_app_root};
use crate::render::{render_progress_line, render_status_line, resolve_output_style, OutputStyle};
use clap::error::ErrorKind;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use updraft_core::{write_release_set, ReleaseEntry, ReleaseSet, ReleaseVersion};
use updraft_installer::AppLayout;

#[test]
fn cli_parses_apply_with_flags() {
    let cli = Cli::try_parse_from([
        "updraft",
        "--root",
        "/opt/demo",
        "apply",
        "--package-dir",
        "/tmp/packages",
        "--silent",
        "--first-install",
    ])
    .expect("command must parse");

    assert_eq!(cli.root.as_deref(), Some(Path::new("/opt/demo")));
    match cli.command {
        Commands::Apply {
            package_dir,
            silent,
            first_install,
        } => {
            assert_eq!(package_dir.as_deref(), Some(Path::new("/tmp/packages")));
            assert!(silent);
            assert!(first_install);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_parses_finish_apply_version() {
    let cli = Cli::try_parse_from(["updraft", "finish-apply", "--version", "1.2.0"])
        .expect("command must parse");
    match cli.command {
        Commands::FinishApply {
            version,
            first_install,
            silent,
        } => {
            assert_eq!(version, "1.2.0");
            assert!(!first_install);
            assert!(!silent);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_rejects_finish_apply_without_version() {
    let err = Cli::try_parse_from(["updraft", "finish-apply"])
        .expect_err("missing version must fail");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn cli_parses_shortcut_create_with_hyphenated_args() {
    let cli = Cli::try_parse_from([
        "updraft",
        "shortcut",
        "create",
        "Demo.exe",
        "--locations",
        "desktop,startup",
        "--update-only",
        "--args",
        "--minimized",
    ])
    .expect("command must parse");

    match cli.command {
        Commands::Shortcut {
            action:
                ShortcutCommands::Create {
                    exe,
                    locations,
                    update_only,
                    extra_args,
                    icon,
                },
        } => {
            assert_eq!(exe, "Demo.exe");
            assert_eq!(locations, "desktop,startup");
            assert!(update_only);
            assert_eq!(extra_args.as_deref(), Some("--minimized"));
            assert!(icon.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_shortcut_remove_defaults_to_desktop_and_start_menu() {
    let cli = Cli::try_parse_from(["updraft", "shortcut", "remove", "Demo.exe"])
        .expect("command must parse");
    match cli.command {
        Commands::Shortcut {
            action: ShortcutCommands::Remove { locations, .. },
        } => assert_eq!(locations, "desktop,start-menu"),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_rejects_root_together_with_app_id() {
    let err = Cli::try_parse_from([
        "updraft", "--root", "/opt/demo", "--app-id", "demo", "current",
    ])
    .expect_err("conflicting root flags must fail");
    assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
}

#[test]
fn cli_rejects_unsupported_completion_shell() {
    let err = Cli::try_parse_from(["updraft", "completions", "tcsh"])
        .expect_err("unsupported shell must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    assert!(err.to_string().contains("tcsh"));
}

#[test]
fn cli_accepts_every_clap_complete_shell() {
    for shell in ["bash", "elvish", "fish", "powershell", "zsh"] {
        let cli = Cli::try_parse_from(["updraft", "completions", shell])
            .unwrap_or_else(|err| panic!("{shell} must parse: {err}"));
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }
}

#[test]
fn completions_script_names_binary() {
    let mut output = Vec::new();
    write_completions_script(clap_complete::Shell::Bash, &mut output)
        .expect("must render completions");
    let script = String::from_utf8(output).expect("script must be utf-8");
    assert!(script.contains("updraft"));
    assert!(script.contains("finish-apply"));
}

#[test]
fn resolve_app_root_prefers_explicit_root() {
    let root = resolve_app_root(Some(Path::new("/opt/demo")), None).expect("must resolve");
    assert_eq!(root, Path::new("/opt/demo"));
}

#[test]
fn resolve_app_root_falls_back_to_binary_directory() {
    let root = resolve_app_root(None, None).expect("must resolve");
    let exe = std::env::current_exe().expect("current exe");
    assert_eq!(Some(root.as_path()), exe.parent());
}

#[test]
fn resolve_output_style_uses_rich_when_stdout_is_tty() {
    assert_eq!(resolve_output_style(true, false), OutputStyle::Rich);
    assert_eq!(resolve_output_style(true, true), OutputStyle::Rich);
}

#[test]
fn resolve_output_style_uses_plain_when_stdout_is_not_tty() {
    assert_eq!(resolve_output_style(false, true), OutputStyle::Plain);
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "current version 1.2.0"),
        "current version 1.2.0"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "hook Demo.exe failed: timed out"),
        "[WARN] hook Demo.exe failed: timed out"
    );
}

#[test]
fn render_progress_line_is_suppressed_in_plain_mode() {
    assert!(render_progress_line(OutputStyle::Plain, "apply", 50, None).is_none());
}

#[test]
fn render_progress_line_clamps_percent() {
    let line = render_progress_line(OutputStyle::Rich, "apply", 250, None)
        .expect("rich mode renders progress");
    assert!(line.contains("100%"));
    assert!(line.contains(&"=".repeat(18)));
}

#[test]
fn log_filter_prefers_updraft_log_over_rust_log() {
    let filter = log_filter(Some("debug"), Some("error"));
    assert_eq!(filter.to_string(), "debug");

    let filter = log_filter(None, Some("warn"));
    assert_eq!(filter.to_string(), "warn");

    let filter = log_filter(None, None);
    assert_eq!(filter.to_string(), "info");
}

#[test]
fn plan_update_without_install_targets_latest_full() {
    let root = test_root();
    let layout = AppLayout::new(&root);
    let set = ReleaseSet::new(vec![
        entry("Demo-1.0.0-full.nupkg"),
        entry("Demo-1.1.0-full.nupkg"),
    ]);

    let request = plan_update(&layout, &set, &layout.packages_dir()).expect("must plan");
    let target = request.target.expect("target must be chosen");
    assert_eq!(target.version, version("1.1.0"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn plan_update_starts_from_installed_version() {
    let root = test_root();
    let layout = AppLayout::new(&root);
    fs::create_dir_all(layout.version_dir(&version("1.0.0"))).expect("must seed version dir");
    let set = ReleaseSet::new(vec![
        entry("Demo-1.0.0-full.nupkg"),
        entry("Demo-1.1.0-delta.nupkg"),
        entry("Demo-1.1.0-full.nupkg"),
    ]);

    let request = plan_update(&layout, &set, &layout.packages_dir()).expect("must plan");
    assert_eq!(
        request.current.map(|current| current.version),
        Some(version("1.0.0"))
    );
    assert!(request
        .pending
        .iter()
        .all(|pending| pending.version == version("1.1.0")));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn plan_update_ignores_deltas_when_installed_version_is_not_cached() {
    let root = test_root();
    let layout = AppLayout::new(&root);
    fs::create_dir_all(layout.version_dir(&version("1.0.0"))).expect("must seed version dir");
    let set = ReleaseSet::new(vec![
        entry("Demo-1.1.0-delta.nupkg"),
        entry("Demo-1.1.0-full.nupkg"),
    ]);

    let request = plan_update(&layout, &set, &layout.packages_dir()).expect("must plan");
    assert!(request.current.is_none());
    assert_eq!(request.pending.len(), 1);
    assert!(!request.pending[0].is_delta);
    assert_eq!(request.pending[0].version, version("1.1.0"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn plan_update_is_noop_when_installed_version_is_newest_uncached() {
    let root = test_root();
    let layout = AppLayout::new(&root);
    fs::create_dir_all(layout.version_dir(&version("2.0.0"))).expect("must seed version dir");
    let set = ReleaseSet::new(vec![
        entry("Demo-1.1.0-full.nupkg"),
        entry("Demo-1.5.0-delta.nupkg"),
    ]);

    let request = plan_update(&layout, &set, &layout.packages_dir()).expect("must plan");
    assert!(request.is_noop());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn doctor_lines_report_layout_and_current_version() {
    let root = test_root();
    let layout = AppLayout::new(&root);
    fs::create_dir_all(layout.version_dir(&version("2.0.0"))).expect("must seed version dir");
    fs::create_dir_all(layout.packages_dir()).expect("must create packages dir");
    write_release_set(&layout.packages_dir(), &ReleaseSet::new(Vec::new()))
        .expect("must write manifest");

    let lines = format_doctor_lines(&layout).expect("must format");
    assert!(lines[0].starts_with("root: "));
    assert!(lines
        .iter()
        .any(|line| line.starts_with("current: ") && line.ends_with("app-2.0.0")));
    assert_eq!(lines.last().map(String::as_str), Some("removed: no"));

    let _ = fs::remove_dir_all(&root);
}

fn entry(filename: &str) -> ReleaseEntry {
    ReleaseEntry::new("0".repeat(64), filename, 1024).expect("valid entry")
}

fn version(raw: &str) -> ReleaseVersion {
    ReleaseVersion::parse(raw).expect("valid version")
}

fn test_root() -> std::path::PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "updraft-cli-test-{}-{nanos}-{seq}",
        std::process::id()
    ))
}

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::warn;
use updraft_core::{
    read_release_set, ReleaseEntry, ReleaseSet, ReleaseVersion, ShortcutLocations, UpdateRequest,
};
use updraft_installer::{
    current_version_dir, default_app_root, AppLayout, ApplyOutcome, HookStatus, UninstallReport,
    UpdateContext, UpdateManager,
};

use crate::completion::write_completions_script;
use crate::render::{OutputStyle, TerminalRenderer};
use crate::{Cli, Commands, ShortcutCommands};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::current();

    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout();
        return write_completions_script(*shell, &mut stdout);
    }

    let root = resolve_app_root(cli.root.as_deref(), cli.app_id.as_deref())?;
    match cli.command {
        Commands::Apply {
            package_dir,
            silent,
            first_install,
        } => {
            let ctx = UpdateContext::load(&root)?;
            let package_dir = package_dir.unwrap_or_else(|| ctx.layout.packages_dir());
            let available = read_release_set(&package_dir)?;
            let request = plan_update(&ctx.layout, &available, &package_dir)?;
            if request.is_noop() {
                renderer.print_status("ok", "no pending releases");
            }

            let manager = UpdateManager::new(ctx);
            let progress = renderer.start_progress("apply");
            let outcome = {
                let bar = progress.bar();
                let report = move |percent: u8| {
                    if let Some(bar) = &bar {
                        bar.set_position(u64::from(percent));
                    }
                };
                manager
                    .apply_releases_detailed(&request, silent, first_install, &report)
                    .await
            };
            finish_apply_output(renderer, progress, outcome).await?;
        }
        Commands::FinishApply {
            version,
            first_install,
            silent,
        } => {
            let version = ReleaseVersion::parse(&version)
                .with_context(|| format!("invalid --version value '{version}'"))?;
            let manager = UpdateManager::new(UpdateContext::load(&root)?);
            let progress = renderer.start_progress("finish");
            let outcome = {
                let bar = progress.bar();
                let report = move |percent: u8| {
                    if let Some(bar) = &bar {
                        bar.set_position(u64::from(percent));
                    }
                };
                manager
                    .finish_apply(&version, silent, first_install, &report)
                    .await
            };
            finish_apply_output(renderer, progress, outcome).await?;
        }
        Commands::Uninstall => {
            let manager = UpdateManager::new(UpdateContext::load(&root)?);
            let report = manager.full_uninstall().await?;
            renderer.print_lines(&format_uninstall_lines(&report, renderer_style()));
        }
        Commands::Shortcut { action } => {
            let shortcuts = UpdateContext::load(&root)?.shortcut_manager();
            match action {
                ShortcutCommands::Create {
                    exe,
                    locations,
                    update_only,
                    extra_args,
                    icon,
                } => {
                    let locations = ShortcutLocations::parse_list(&locations)?;
                    shortcuts.create_or_update(
                        &exe,
                        locations,
                        update_only,
                        extra_args.as_deref(),
                        icon.as_deref(),
                    )?;
                    renderer.print_status("ok", &format!("shortcuts updated for {exe}"));
                }
                ShortcutCommands::Remove { exe, locations } => {
                    let locations = ShortcutLocations::parse_list(&locations)?;
                    shortcuts.remove(&exe, locations)?;
                    renderer.print_status("ok", &format!("shortcuts removed for {exe}"));
                }
                ShortcutCommands::List {
                    exe,
                    locations,
                    extra_args,
                } => {
                    let locations = ShortcutLocations::parse_list(&locations)?;
                    let records = shortcuts.get_shortcuts(&exe, locations, extra_args.as_deref())?;
                    let paths = shortcuts.link_paths(&exe, locations)?;
                    for (location, record) in records {
                        let path = paths
                            .get(&location)
                            .map(|path| path.display().to_string())
                            .unwrap_or_default();
                        let json = serde_json::json!({
                            "location": location.as_str(),
                            "link": path,
                            "exists": paths.get(&location).is_some_and(|path| path.exists()),
                            "target": record.target,
                            "arguments": record.arguments,
                            "working_directory": record.working_directory,
                            "icon": record.icon_path,
                            "description": record.description,
                        });
                        println!("{json}");
                    }
                }
            }
        }
        Commands::Current => {
            let layout = AppLayout::new(&root);
            match current_version_dir(&layout)? {
                Some(current) => println!("{}", current.path.display()),
                None => renderer.print_status("warn", "no version is installed"),
            }
        }
        Commands::Doctor => {
            let layout = AppLayout::new(&root);
            renderer.print_section("layout");
            renderer.print_lines(&format_doctor_lines(&layout)?);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn renderer_style() -> OutputStyle {
    crate::render::current_output_style()
}

/// Picks the app root: explicit `--root`, then `--app-id`, then the directory of this binary.
pub(crate) fn resolve_app_root(root: Option<&Path>, app_id: Option<&str>) -> Result<PathBuf> {
    if let Some(root) = root {
        return Ok(root.to_path_buf());
    }
    if let Some(app_id) = app_id {
        return default_app_root(app_id);
    }
    let exe = std::env::current_exe().context("failed to resolve running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("running executable has no parent directory: {}", exe.display()))
}

/// Builds the request from the cache manifest and the installed version.
pub(crate) fn plan_update(
    layout: &AppLayout,
    available: &ReleaseSet,
    package_dir: &Path,
) -> Result<UpdateRequest> {
    let Some(installed) = current_version_dir(layout)? else {
        return Ok(UpdateRequest::plan(None, available, package_dir));
    };

    if let Some(entry) = available.full_for_version(&installed.version) {
        return Ok(UpdateRequest::plan(Some(entry.clone()), available, package_dir));
    }

    warn!(
        version = %installed.version,
        "installed version has no full package in the cache; only full packages can apply"
    );
    let newer = available
        .latest_full()
        .filter(|entry| entry.version > installed.version)
        .cloned()
        .into_iter()
        .collect::<Vec<ReleaseEntry>>();
    Ok(UpdateRequest::plan(None, &ReleaseSet::new(newer), package_dir))
}

async fn finish_apply_output(
    renderer: TerminalRenderer,
    mut progress: crate::render::TerminalProgress,
    outcome: Result<ApplyOutcome>,
) -> Result<()> {
    let outcome = match outcome {
        Ok(outcome) => {
            progress.set(100);
            progress.finish_success();
            outcome
        }
        Err(err) => {
            progress.finish_abandon();
            return Err(err);
        }
    };

    let style = renderer_style();
    renderer.print_lines(&format_apply_lines(&outcome, style));
    if let Some(handle) = outcome.first_run {
        for launch in handle.outcome().await? {
            if let Some(error) = launch.error {
                renderer.print_status(
                    "warn",
                    &format!("failed to launch {}: {error}", launch.executable.display()),
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn format_apply_lines(outcome: &ApplyOutcome, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    let status = if outcome.delegated { "handoff" } else { "ok" };
    let message = if outcome.delegated {
        format!(
            "installed {} at {}; new updater is finishing the apply",
            outcome.version,
            outcome.current_dir.display()
        )
    } else {
        format!(
            "current version {} at {}",
            outcome.version,
            outcome.current_dir.display()
        )
    };
    lines.push(crate::render::render_status_line(style, status, &message));
    for hook in &outcome.hook_outcomes {
        if let Some(line) = format_hook_failure(&hook.executable, &hook.status, style) {
            lines.push(line);
        }
    }
    lines
}

fn format_hook_failure(executable: &Path, status: &HookStatus, style: OutputStyle) -> Option<String> {
    let reason = match status {
        HookStatus::Succeeded => return None,
        HookStatus::Failed(reason) => reason.clone(),
        HookStatus::TimedOut => "timed out".to_string(),
    };
    Some(crate::render::render_status_line(
        style,
        "warn",
        &format!("hook {} failed: {reason}", executable.display()),
    ))
}

pub(crate) fn format_uninstall_lines(report: &UninstallReport, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    let version = report
        .version
        .map(|version| version.to_string())
        .unwrap_or_else(|| "none".to_string());
    lines.push(crate::render::render_status_line(
        style,
        "ok",
        &format!(
            "uninstalled version={version} root={:?} unpinned={}",
            report.root_removal, report.pins.unpinned
        ),
    ));
    for hook in &report.hook_outcomes {
        if let Some(line) = format_hook_failure(&hook.executable, &hook.status, style) {
            lines.push(line);
        }
    }
    lines
}

pub(crate) fn format_doctor_lines(layout: &AppLayout) -> Result<Vec<String>> {
    let current = current_version_dir(layout)?
        .map(|dir| dir.path.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    Ok(vec![
        format!("root: {}", layout.root().display()),
        format!("packages: {}", layout.packages_dir().display()),
        format!("manifest: {}", layout.manifest_path().display()),
        format!("updater: {}", layout.updater_path().display()),
        format!("config: {}", layout.config_path().display()),
        format!("current: {current}"),
        format!(
            "removed: {}",
            if layout.root_dead_sentinel().exists() {
                "yes"
            } else {
                "no"
            }
        ),
    ])
}

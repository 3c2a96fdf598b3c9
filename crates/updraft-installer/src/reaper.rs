use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use updraft_core::{parse_package_filename, rebuild_release_set, list_package_files, ReleaseVersion};

use crate::context::UpdateContext;
use crate::fs_utils::{delete_dir_with_retries, DeleteOutcome};
use crate::lifecycle::{lifecycle_aware_executables, read_installed_metadata, HookKind, HookRunner};
use crate::versions::{mark_dead, scan_version_dirs, VersionDirState, VersionedDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOptions {
    pub run_obsolete_hooks: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            run_obsolete_hooks: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub marked_dead: Vec<PathBuf>,
    pub deleted_packages: Vec<PathBuf>,
}

/// Removes every version directory outside the retention window and prunes
/// the package cache down to the current full package.
///
/// The window is `current` plus the closest installed version below it.
pub async fn cleanup_dead_versions(
    ctx: &UpdateContext,
    hooks: &HookRunner,
    current: &ReleaseVersion,
    options: CleanupOptions,
) -> Result<CleanupReport> {
    let dirs = scan_version_dirs(&ctx.layout)?;
    let previous = dirs
        .iter()
        .filter(|dir| dir.state == VersionDirState::Installed && dir.version < *current)
        .map(|dir| dir.version)
        .max();
    let candidates = dirs
        .into_iter()
        .filter(|dir| dir.version != *current && Some(dir.version) != previous)
        .collect::<Vec<_>>();

    let mut report = CleanupReport::default();
    for dir in candidates {
        if options.run_obsolete_hooks && dir.state == VersionDirState::Installed {
            run_obsolete_hooks(ctx, hooks, &dir).await;
        }
        reap_dir(ctx, dir, &mut report).await;
    }

    let package_dir = ctx.layout.packages_dir();
    let current = *current;
    let deleted = tokio::task::spawn_blocking(move || prune_package_cache(&package_dir, &current))
        .await
        .context("package cache cleanup task failed")??;
    report.deleted_packages = deleted;

    info!(
        removed = report.removed.len(),
        marked_dead = report.marked_dead.len(),
        deleted_packages = report.deleted_packages.len(),
        "cleanup finished"
    );
    Ok(report)
}

async fn run_obsolete_hooks(ctx: &UpdateContext, hooks: &HookRunner, dir: &VersionedDir) {
    let metadata = read_installed_metadata(&dir.path).unwrap_or_else(|err| {
        warn!(dir = %dir.path.display(), error = %format!("{err:#}"), "ignoring unreadable package metadata");
        None
    });
    let executables =
        match lifecycle_aware_executables(&dir.path, metadata.as_ref(), ctx.resources.as_ref()) {
            Ok(executables) => executables,
            Err(err) => {
                warn!(dir = %dir.path.display(), error = %format!("{err:#}"), "could not list executables for obsolete hooks");
                return;
            }
        };
    if executables.is_empty() {
        return;
    }
    hooks
        .invoke(
            &HookKind::Obsolete.arguments(&dir.version),
            &executables,
            ctx.config.hook_timeout(),
        )
        .await;
}

async fn reap_dir(ctx: &UpdateContext, dir: VersionedDir, report: &mut CleanupReport) {
    let policy = ctx.retry_policy();
    let remover = Arc::clone(&ctx.remover);
    let path = dir.path.clone();
    let outcome =
        tokio::task::spawn_blocking(move || delete_dir_with_retries(&path, policy, remover.as_ref()))
            .await
            .unwrap_or(DeleteOutcome::Stuck);

    if outcome == DeleteOutcome::Removed && !dir.path.exists() {
        debug!(dir = %dir.path.display(), "removed old version");
        report.removed.push(dir.path);
        return;
    }
    if dir.state == VersionDirState::Dead {
        return;
    }
    match mark_dead(&dir.path) {
        Ok(()) => {
            info!(dir = %dir.path.display(), "marked old version dead");
            report.marked_dead.push(dir.path);
        }
        Err(err) => {
            warn!(dir = %dir.path.display(), error = %format!("{err:#}"), "failed to mark old version dead")
        }
    }
}

/// Deletes every cached package except the full package for `current`, then
/// rewrites the manifest from what is left.
pub fn prune_package_cache(
    package_dir: &std::path::Path,
    current: &ReleaseVersion,
) -> Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();
    for path in list_package_files(package_dir)? {
        let keep = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| parse_package_filename(name).ok())
            .is_some_and(|(_, version, is_delta)| !is_delta && version == *current);
        if keep {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(package = %path.display(), "deleted cached package");
                deleted.push(path);
            }
            Err(err) => warn!(package = %path.display(), error = %err, "failed to delete cached package"),
        }
    }

    rebuild_release_set(package_dir)?;
    Ok(deleted)
}

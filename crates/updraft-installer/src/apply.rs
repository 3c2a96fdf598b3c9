use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use updraft_core::{rebuild_release_set, ReleaseVersion, ShortcutLocations, UpdateRequest};
use updraft_resolver::resolve_delta_chain;

use crate::context::UpdateContext;
use crate::fs_utils::remove_file_if_exists;
use crate::lifecycle::{
    lifecycle_aware_executables, list_executables, read_installed_metadata, FirstRunHandle,
    HookKind, HookOutcome, HookRunner,
};
use crate::package::install_package;
use crate::reaper::{cleanup_dead_versions, CleanupOptions};
use crate::selfupdate::{
    replace_bootstrap_from_running, update_bootstrap_updater, SelfUpdateOutcome,
};
use crate::versions::{current_version_dir, version_dir_state, VersionDirState};

pub const PROGRESS_RESOLVED: u8 = 10;
pub const PROGRESS_INSTALLED: u8 = 30;
pub const PROGRESS_MANIFEST: u8 = 50;
pub const PROGRESS_HOOKS: u8 = 70;
pub const PROGRESS_SHORTCUTS: u8 = 85;
pub const PROGRESS_DONE: u8 = 100;

pub type Progress<'a> = &'a (dyn Fn(u8) + Send + Sync);

#[derive(Debug)]
pub struct ApplyOutcome {
    pub current_dir: PathBuf,
    pub version: ReleaseVersion,
    /// The remaining steps were handed to the newly installed updater.
    pub delegated: bool,
    pub hook_outcomes: Vec<HookOutcome>,
    pub first_run: Option<FirstRunHandle>,
}

/// Drives applies and uninstalls for one app root.
pub struct UpdateManager {
    ctx: UpdateContext,
    hooks: HookRunner,
}

impl UpdateManager {
    pub fn new(ctx: UpdateContext) -> Self {
        let hooks = HookRunner::new(Arc::clone(&ctx.launcher));
        Self { ctx, hooks }
    }

    pub fn context(&self) -> &UpdateContext {
        &self.ctx
    }

    pub(crate) fn hooks(&self) -> &HookRunner {
        &self.hooks
    }

    /// Moves the install to the release `request` leads to and returns the new current directory.
    pub async fn apply_releases(
        &self,
        request: &UpdateRequest,
        silent_install: bool,
        first_install: bool,
        progress: Progress<'_>,
    ) -> Result<PathBuf> {
        self.apply_releases_detailed(request, silent_install, first_install, progress)
            .await
            .map(|outcome| outcome.current_dir)
    }

    pub async fn apply_releases_detailed(
        &self,
        request: &UpdateRequest,
        silent_install: bool,
        first_install: bool,
        progress: Progress<'_>,
    ) -> Result<ApplyOutcome> {
        let layout = &self.ctx.layout;
        layout.ensure_base_dirs()?;
        if first_install && layout.root_dead_sentinel().exists() {
            info!(root = %layout.root().display(), "reinstalling into a previously removed app root");
            remove_file_if_exists(&layout.root_dead_sentinel()).with_context(|| {
                format!(
                    "failed to clear dead sentinel: {}",
                    layout.root_dead_sentinel().display()
                )
            })?;
        }

        let base = request.current.clone();
        let pending = request.pending.clone();
        let package_dir = request.package_dir.clone();
        let builder = Arc::clone(&self.ctx.delta_builder);
        let target = tokio::task::spawn_blocking(move || {
            resolve_delta_chain(base.as_ref(), &pending, &package_dir, builder.as_ref())
        })
        .await
        .context("delta resolution task failed")??;

        let Some(target) = target else {
            info!("no pending releases; checking the installed version");
            return self
                .already_installed(silent_install, first_install, progress)
                .await;
        };
        info!(version = %target.version, package = %target.filename, "resolved target release");
        progress(PROGRESS_RESOLVED);

        let install_layout = layout.clone();
        let install_entry = target.clone();
        let package_dir = request.package_dir.clone();
        let extractor = Arc::clone(&self.ctx.extractor);
        let new_dir = tokio::task::spawn_blocking(move || {
            install_package(
                &install_layout,
                &install_entry,
                &package_dir,
                extractor.as_ref(),
            )
        })
        .await
        .context("package install task failed")??;
        progress(PROGRESS_INSTALLED);

        let package_dir = request.package_dir.clone();
        tokio::task::spawn_blocking(move || rebuild_release_set(&package_dir))
            .await
            .context("manifest rebuild task failed")??;
        progress(PROGRESS_MANIFEST);

        let metadata = read_installed_metadata(&new_dir).unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "ignoring unreadable package metadata");
            None
        });
        match update_bootstrap_updater(
            &self.ctx,
            &new_dir,
            &target.version,
            metadata.as_ref(),
            first_install,
            silent_install,
        )
        .await
        {
            Ok(SelfUpdateOutcome::Delegated) => {
                return Ok(ApplyOutcome {
                    current_dir: new_dir,
                    version: target.version,
                    delegated: true,
                    hook_outcomes: Vec::new(),
                    first_run: None,
                });
            }
            Ok(_) => {}
            Err(err) => warn!(error = %format!("{err:#}"), "failed to update bootstrap updater"),
        }

        self.finish_apply(&target.version, silent_install, first_install, progress)
            .await
    }

    /// Runs the post-install steps for a version that is already on disk:
    /// hooks, pinned shortcuts, default shortcuts, first run and cleanup.
    pub async fn finish_apply(
        &self,
        version: &ReleaseVersion,
        silent_install: bool,
        first_install: bool,
        progress: Progress<'_>,
    ) -> Result<ApplyOutcome> {
        let version_dir = self.ctx.layout.version_dir(version);
        if !version_dir.is_dir() || version_dir_state(&version_dir) != VersionDirState::Installed {
            return Err(anyhow!(
                "version {version} is not installed at {}",
                version_dir.display()
            ));
        }

        if let Err(err) = replace_bootstrap_from_running(&self.ctx, &version_dir).await {
            warn!(error = %format!("{err:#}"), "failed to replace bootstrap updater after handoff");
        }

        let aware = self.lifecycle_aware(&version_dir);
        let kind = if first_install {
            HookKind::Install
        } else {
            HookKind::Updated
        };
        let hook_outcomes = self
            .hooks
            .invoke(&kind.arguments(version), &aware, self.ctx.config.hook_timeout())
            .await;
        progress(PROGRESS_HOOKS);

        self.ctx.pin_fixer().fix_pinned_shortcuts(&version_dir);
        self.forget_dead_tray_entries(&version_dir);
        if aware.is_empty() {
            self.reconcile_default_shortcuts(&version_dir, first_install);
        }
        progress(PROGRESS_SHORTCUTS);

        let first_run = self.maybe_launch_first_run(&version_dir, &aware, silent_install, first_install);

        if let Err(err) =
            cleanup_dead_versions(&self.ctx, &self.hooks, version, CleanupOptions::default()).await
        {
            warn!(error = %format!("{err:#}"), "cleanup after apply failed");
        }
        progress(PROGRESS_DONE);

        info!(version = %version, dir = %version_dir.display(), "apply finished");
        Ok(ApplyOutcome {
            current_dir: version_dir,
            version: *version,
            delegated: false,
            hook_outcomes,
            first_run,
        })
    }

    fn forget_dead_tray_entries(&self, version_dir: &Path) {
        let executables = match list_executables(version_dir) {
            Ok(executables) => executables,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to list executables for tray cleanup");
                return;
            }
        };
        match self
            .ctx
            .tray
            .remove_dead_entries(self.ctx.layout.root(), &executables)
        {
            Ok(0) => {}
            Ok(removed) => info!(removed, "removed stale tray entries"),
            Err(err) => warn!(error = %format!("{err:#}"), "failed to clean tray entries"),
        }
    }

    async fn already_installed(
        &self,
        silent_install: bool,
        first_install: bool,
        progress: Progress<'_>,
    ) -> Result<ApplyOutcome> {
        let current = current_version_dir(&self.ctx.layout)?.ok_or_else(|| {
            anyhow!(
                "nothing to apply and no version is installed under {}",
                self.ctx.layout.root().display()
            )
        })?;

        let aware = self.lifecycle_aware(&current.path);
        let hook_outcomes = if first_install {
            self.hooks
                .invoke(
                    &HookKind::Install.arguments(&current.version),
                    &aware,
                    self.ctx.config.hook_timeout(),
                )
                .await
        } else {
            Vec::new()
        };
        if aware.is_empty() {
            self.reconcile_default_shortcuts(&current.path, first_install);
        }
        let first_run = self.maybe_launch_first_run(&current.path, &aware, silent_install, first_install);
        progress(PROGRESS_DONE);

        Ok(ApplyOutcome {
            current_dir: current.path,
            version: current.version,
            delegated: false,
            hook_outcomes,
            first_run,
        })
    }

    pub(crate) fn lifecycle_aware(&self, version_dir: &Path) -> Vec<PathBuf> {
        let metadata = read_installed_metadata(version_dir).unwrap_or_else(|err| {
            warn!(dir = %version_dir.display(), error = %format!("{err:#}"), "ignoring unreadable package metadata");
            None
        });
        lifecycle_aware_executables(version_dir, metadata.as_ref(), self.ctx.resources.as_ref())
            .unwrap_or_else(|err| {
                warn!(dir = %version_dir.display(), error = %format!("{err:#}"), "could not list lifecycle-aware executables");
                Vec::new()
            })
    }

    /// Shortcuts for apps that do not manage their own: created on first
    /// install, refreshed where they still exist on update.
    fn reconcile_default_shortcuts(&self, version_dir: &Path, first_install: bool) {
        let executables = match list_executables(version_dir) {
            Ok(executables) => executables,
            Err(err) => {
                warn!(dir = %version_dir.display(), error = %format!("{err:#}"), "could not list executables for shortcuts");
                return;
            }
        };
        let locations = if first_install {
            self.ctx.config.shortcut_locations().unwrap_or_else(|err| {
                warn!(error = %format!("{err:#}"), "invalid default shortcut locations");
                ShortcutLocations::NONE
            })
        } else {
            ShortcutLocations::all()
        };

        let shortcuts = self.ctx.shortcut_manager();
        for executable in executables {
            let Some(name) = executable.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Err(err) = shortcuts.create_or_update(name, locations, !first_install, None, None)
            {
                warn!(exe = name, error = %format!("{err:#}"), "failed to reconcile shortcuts");
            }
        }
    }

    fn maybe_launch_first_run(
        &self,
        version_dir: &Path,
        aware: &[PathBuf],
        silent_install: bool,
        first_install: bool,
    ) -> Option<FirstRunHandle> {
        if !first_install || silent_install || !self.ctx.config.first_run_enabled {
            return None;
        }
        let targets = if aware.is_empty() {
            list_executables(version_dir).unwrap_or_else(|err| {
                warn!(dir = %version_dir.display(), error = %format!("{err:#}"), "could not list executables for first run");
                Vec::new()
            })
        } else {
            aware.to_vec()
        };
        if targets.is_empty() {
            return None;
        }
        Some(self.hooks.launch_first_run(targets))
    }
}

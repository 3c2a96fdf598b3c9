use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use updraft_core::{ReleaseVersion, ShortcutLocations};

use crate::apply::UpdateManager;
use crate::fs_utils::{delete_dir_with_retries, write_sentinel, DeleteOutcome};
use crate::lifecycle::{list_executables, HookKind, HookOutcome};
use crate::pins::PinFixReport;
use crate::versions::{current_version_dir, scan_version_dirs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    pub version: Option<ReleaseVersion>,
    pub hook_outcomes: Vec<HookOutcome>,
    pub pins: PinFixReport,
    pub root_removal: DeleteOutcome,
}

impl UpdateManager {
    /// Removes the whole app. Every phase is best-effort; only writing the
    /// root dead sentinel can fail the call.
    pub async fn full_uninstall(&self) -> Result<UninstallReport> {
        let ctx = self.context();
        let layout = &ctx.layout;
        info!(root = %layout.root().display(), "uninstalling app");

        let mut version = None;
        let mut hook_outcomes = Vec::new();
        match current_version_dir(layout) {
            Ok(Some(current)) => {
                version = Some(current.version);
                let aware = self.lifecycle_aware(&current.path);
                if aware.is_empty() {
                    self.remove_default_shortcuts(&current.path);
                } else {
                    hook_outcomes = self
                        .hooks()
                        .invoke(
                            &HookKind::Uninstall.arguments(&current.version),
                            &aware,
                            ctx.config.hook_timeout(),
                        )
                        .await;
                }
            }
            Ok(None) => info!("no installed version found; skipping uninstall hooks"),
            Err(err) => warn!(error = %format!("{err:#}"), "could not locate current version"),
        }

        let names = running_image_names(self);
        if let Err(err) = ctx
            .launcher
            .terminate_matching(&names, ctx.config.process_kill_grace())
            .await
        {
            warn!(error = %format!("{err:#}"), "failed to stop running app processes");
        }

        let pins = ctx.pin_fixer().unpin_app_shortcuts();

        let root = layout.root().to_path_buf();
        let policy = ctx.retry_policy();
        let remover = Arc::clone(&ctx.remover);
        let root_removal =
            tokio::task::spawn_blocking(move || delete_dir_with_retries(&root, policy, remover.as_ref()))
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, "app root deletion task failed");
                    DeleteOutcome::Stuck
                });

        write_sentinel(&layout.root_dead_sentinel())?;
        info!(root = %layout.root().display(), outcome = ?root_removal, "uninstall finished");

        Ok(UninstallReport {
            version,
            hook_outcomes,
            pins,
            root_removal,
        })
    }

    fn remove_default_shortcuts(&self, version_dir: &std::path::Path) {
        let executables = match list_executables(version_dir) {
            Ok(executables) => executables,
            Err(err) => {
                warn!(dir = %version_dir.display(), error = %format!("{err:#}"), "could not list executables for shortcut removal");
                return;
            }
        };
        let shortcuts = self.context().shortcut_manager();
        for executable in executables {
            let Some(name) = executable.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Err(err) = shortcuts.remove(name, ShortcutLocations::all()) {
                warn!(exe = name, error = %format!("{err:#}"), "failed to remove shortcuts");
            }
        }
    }
}

/// Image names of every executable in any version directory of the app.
fn running_image_names(manager: &UpdateManager) -> Vec<String> {
    let dirs = match scan_version_dirs(&manager.context().layout) {
        Ok(dirs) => dirs,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "could not scan version directories");
            return Vec::new();
        }
    };
    let mut names = BTreeSet::new();
    for dir in dirs.iter().filter(|dir| dir.is_live()) {
        for executable in list_executables(&dir.path).unwrap_or_default() {
            if let Some(name) = executable.file_name().and_then(|name| name.to_str()) {
                names.insert(name.to_string());
            }
        }
    }
    names.into_iter().collect()
}

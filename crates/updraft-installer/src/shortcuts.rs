use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use updraft_core::{PackageMetadata, ShortcutLocation, ShortcutLocations, ShortcutRecord};

use crate::fs_utils::remove_file_if_exists;
use crate::interop::{ShellFolders, ShellLinks, VersionResource, VersionResourceReader};
use crate::layout::AppLayout;
use crate::lifecycle::read_installed_metadata;
use crate::pins::PinnedShortcutFixer;
use crate::versions::current_version_dir;

const PROCESS_START_FLAG: &str = "--processStart";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ShortcutIdentity {
    title: String,
    company: String,
    description: String,
    app_id: String,
}

/// Creates, refreshes and removes shell shortcuts for an app's executables.
///
/// Shortcuts always launch the bootstrap updater with `--processStart`, so
/// they stay valid when the versioned directory changes.
#[derive(Clone)]
pub struct ShortcutManager {
    layout: AppLayout,
    folders: ShellFolders,
    links: Arc<dyn ShellLinks>,
    resources: Arc<dyn VersionResourceReader>,
    pins: PinnedShortcutFixer,
}

impl ShortcutManager {
    pub fn new(
        layout: AppLayout,
        folders: ShellFolders,
        links: Arc<dyn ShellLinks>,
        resources: Arc<dyn VersionResourceReader>,
        pins: PinnedShortcutFixer,
    ) -> Self {
        Self {
            layout,
            folders,
            links,
            resources,
            pins,
        }
    }

    pub fn create_or_update(
        &self,
        exe_name: &str,
        locations: ShortcutLocations,
        update_only: bool,
        extra_args: Option<&str>,
        icon_override: Option<&Path>,
    ) -> Result<()> {
        let version_dir = self.require_current_dir()?;
        for (location, link, mut record) in
            self.plan(&version_dir, exe_name, locations, extra_args)
        {
            if update_only && !link.exists() {
                debug!(location = %location, link = %link.display(), "shortcut was removed; leaving it alone");
                continue;
            }
            if let Some(icon) = icon_override {
                record.icon_path = icon.to_path_buf();
            }
            if let Err(err) = remove_file_if_exists(&link) {
                warn!(link = %link.display(), error = %err, "failed to replace shortcut");
                continue;
            }
            match self.links.save(&link, &record) {
                Ok(()) => debug!(location = %location, link = %link.display(), "wrote shortcut"),
                Err(err) => {
                    warn!(location = %location, link = %link.display(), error = %format!("{err:#}"), "failed to write shortcut")
                }
            }
        }

        self.pins.fix_pinned_shortcuts(&version_dir);
        Ok(())
    }

    pub fn remove(&self, exe_name: &str, locations: ShortcutLocations) -> Result<()> {
        let Some(current) = current_version_dir(&self.layout)? else {
            debug!(exe = exe_name, "no installed version; no shortcuts to remove");
            return Ok(());
        };
        for (location, link, _) in self.plan(&current.path, exe_name, locations, None) {
            match remove_file_if_exists(&link) {
                Ok(()) => debug!(location = %location, link = %link.display(), "removed shortcut"),
                Err(err) => warn!(link = %link.display(), error = %err, "failed to remove shortcut"),
            }
        }

        self.pins.fix_pinned_shortcuts(&current.path);
        Ok(())
    }

    /// Records the shortcuts `create_or_update` would write, keyed by location.
    pub fn get_shortcuts(
        &self,
        exe_name: &str,
        locations: ShortcutLocations,
        extra_args: Option<&str>,
    ) -> Result<BTreeMap<ShortcutLocation, ShortcutRecord>> {
        let version_dir = self.require_current_dir()?;
        Ok(self
            .plan(&version_dir, exe_name, locations, extra_args)
            .into_iter()
            .map(|(location, _, record)| (location, record))
            .collect())
    }

    pub fn link_paths(
        &self,
        exe_name: &str,
        locations: ShortcutLocations,
    ) -> Result<BTreeMap<ShortcutLocation, PathBuf>> {
        let version_dir = self.require_current_dir()?;
        Ok(self
            .plan(&version_dir, exe_name, locations, None)
            .into_iter()
            .map(|(location, link, _)| (location, link))
            .collect())
    }

    fn require_current_dir(&self) -> Result<PathBuf> {
        current_version_dir(&self.layout)?
            .map(|dir| dir.path)
            .ok_or_else(|| {
                anyhow!(
                    "no installed version found under {}",
                    self.layout.root().display()
                )
            })
    }

    fn plan(
        &self,
        version_dir: &Path,
        exe_name: &str,
        locations: ShortcutLocations,
        extra_args: Option<&str>,
    ) -> Vec<(ShortcutLocation, PathBuf, ShortcutRecord)> {
        let executable = version_dir.join(exe_name);
        let identity = self.identity(version_dir, &executable, exe_name);

        let mut arguments = format!("{PROCESS_START_FLAG} {exe_name}");
        if let Some(extra) = extra_args.map(str::trim).filter(|extra| !extra.is_empty()) {
            arguments.push(' ');
            arguments.push_str(extra);
        }
        let record = ShortcutRecord {
            target: self.layout.updater_path(),
            working_directory: self.layout.root().to_path_buf(),
            icon_path: executable,
            icon_index: 0,
            description: identity.description.clone(),
            arguments,
            app_user_model_id: identity.app_id.clone(),
        };

        locations
            .iter()
            .map(|location| (location, self.link_path(location, &identity), record.clone()))
            .collect()
    }

    fn link_path(&self, location: ShortcutLocation, identity: &ShortcutIdentity) -> PathBuf {
        let file_name = format!("{}.lnk", sanitize_file_name(&identity.title));
        match location {
            ShortcutLocation::Desktop => self.folders.desktop.join(file_name),
            ShortcutLocation::StartMenu => self
                .folders
                .start_menu
                .join(sanitize_file_name(&identity.company))
                .join(file_name),
            ShortcutLocation::Startup => self.folders.startup.join(file_name),
            ShortcutLocation::AppRoot => self.layout.root().join(file_name),
            ShortcutLocation::Taskbar => self.folders.taskbar.join(file_name),
        }
    }

    fn identity(&self, version_dir: &Path, executable: &Path, exe_name: &str) -> ShortcutIdentity {
        let resource = match self.resources.read(executable) {
            Ok(resource) => resource.unwrap_or_default(),
            Err(err) => {
                debug!(executable = %executable.display(), error = %format!("{err:#}"), "could not read version resource");
                VersionResource::default()
            }
        };
        let metadata = match read_installed_metadata(version_dir) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(dir = %version_dir.display(), error = %format!("{err:#}"), "ignoring unreadable package metadata");
                None
            }
        };
        let stem = Path::new(exe_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(exe_name)
            .to_string();

        let title = first_non_empty([
            resource.product_name.as_deref(),
            metadata.as_ref().and_then(|m| m.title.as_deref()),
            Some(stem.as_str()),
        ]);
        let company = first_non_empty([
            resource.company_name.as_deref(),
            metadata.as_ref().and_then(|m| m.company.as_deref()),
            Some(stem.as_str()),
        ]);
        let description = first_non_empty([
            resource.file_description.as_deref(),
            metadata.as_ref().and_then(|m| m.description.as_deref()),
            Some(title.as_str()),
        ]);
        let app_id = app_user_model_id(metadata.as_ref(), &self.layout, &stem);

        ShortcutIdentity {
            title,
            company,
            description,
            app_id,
        }
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<&str>; N]) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn app_user_model_id(metadata: Option<&PackageMetadata>, layout: &AppLayout, stem: &str) -> String {
    let app = metadata
        .map(|metadata| metadata.id.clone())
        .or_else(|| {
            layout
                .root()
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "app".to_string());
    format!("com.updraft.{app}.{stem}")
}

fn sanitize_file_name(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect()
}

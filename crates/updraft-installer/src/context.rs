use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use updraft_core::UpdaterConfig;
use updraft_resolver::{DeltaBuilder, ZstdDeltaBuilder};

use crate::fs_utils::{DirRemover, FsDirRemover, RetryPolicy};
use crate::interop::{
    NoVersionResources, PackageExtractor, PlatformCapabilities, ProcessLauncher, ShellFolders,
    ShellLinks, ShellTrayState, SystemProcessLauncher, TomlShellLinks, TrayState,
    VersionResourceReader, ZipPackageExtractor,
};
use crate::layout::AppLayout;
use crate::pins::PinnedShortcutFixer;
use crate::shortcuts::ShortcutManager;

/// Everything an apply or uninstall needs: the app root, its config and the
/// collaborators used to touch the OS.
#[derive(Clone)]
pub struct UpdateContext {
    pub layout: AppLayout,
    pub config: UpdaterConfig,
    pub folders: ShellFolders,
    pub capabilities: PlatformCapabilities,
    pub extractor: Arc<dyn PackageExtractor>,
    pub delta_builder: Arc<dyn DeltaBuilder>,
    pub resources: Arc<dyn VersionResourceReader>,
    pub links: Arc<dyn ShellLinks>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub remover: Arc<dyn DirRemover>,
    pub tray: Arc<dyn TrayState>,
    /// Path of the running binary, used to decide whether a self-update can hand off.
    pub running_executable: Option<PathBuf>,
}

impl UpdateContext {
    pub fn new(layout: AppLayout, config: UpdaterConfig, folders: ShellFolders) -> Self {
        Self {
            layout,
            config,
            folders,
            capabilities: PlatformCapabilities::detect(),
            extractor: Arc::new(ZipPackageExtractor),
            delta_builder: Arc::new(ZstdDeltaBuilder),
            resources: Arc::new(NoVersionResources),
            links: Arc::new(TomlShellLinks),
            launcher: Arc::new(SystemProcessLauncher),
            remover: Arc::new(FsDirRemover),
            tray: Arc::new(ShellTrayState),
            running_executable: None,
        }
    }

    /// Context for a real app root: config from `updater.toml`, the user's shell folders.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = AppLayout::new(root);
        let config = layout.load_config()?;
        let folders = ShellFolders::detect()?;
        let running = std::env::current_exe().context("failed to resolve running executable")?;
        Ok(Self::new(layout, config, folders).with_running_executable(running))
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_remover(mut self, remover: Arc<dyn DirRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn with_tray(mut self, tray: Arc<dyn TrayState>) -> Self {
        self.tray = tray;
        self
    }

    pub fn with_links(mut self, links: Arc<dyn ShellLinks>) -> Self {
        self.links = links;
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn VersionResourceReader>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_running_executable(mut self, path: PathBuf) -> Self {
        self.running_executable = Some(path);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }

    pub fn pin_fixer(&self) -> PinnedShortcutFixer {
        PinnedShortcutFixer::new(
            self.layout.clone(),
            self.folders.pin_search_roots(),
            Arc::clone(&self.links),
            self.capabilities,
            self.config.pinned_shortcuts,
        )
    }

    pub fn shortcut_manager(&self) -> ShortcutManager {
        ShortcutManager::new(
            self.layout.clone(),
            self.folders.clone(),
            Arc::clone(&self.links),
            Arc::clone(&self.resources),
            self.pin_fixer(),
        )
    }
}

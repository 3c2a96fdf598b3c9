use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use updraft_core::{
    manifest_path, ReleaseVersion, UpdaterConfig, CONFIG_FILE_NAME, PACKAGE_METADATA_FILE,
};

pub const VERSION_DIR_PREFIX: &str = "app-";
pub const DEAD_SENTINEL: &str = ".dead";
pub const INSTALLING_MARKER: &str = ".installing";
pub const PACKAGES_DIR: &str = "packages";

#[cfg(windows)]
pub const UPDATER_BINARY_NAME: &str = "Update.exe";
#[cfg(not(windows))]
pub const UPDATER_BINARY_NAME: &str = "update";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLayout {
    root: PathBuf,
}

impl AppLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join(PACKAGES_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.packages_dir())
    }

    pub fn version_dir(&self, version: &ReleaseVersion) -> PathBuf {
        self.root.join(format!("{VERSION_DIR_PREFIX}{version}"))
    }

    pub fn root_dead_sentinel(&self) -> PathBuf {
        self.root.join(DEAD_SENTINEL)
    }

    pub fn updater_path(&self) -> PathBuf {
        self.root.join(UPDATER_BINARY_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn load_config(&self) -> Result<UpdaterConfig> {
        UpdaterConfig::load(&self.config_path())
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.packages_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn dead_sentinel_path(version_dir: &Path) -> PathBuf {
    version_dir.join(DEAD_SENTINEL)
}

pub fn installing_marker_path(version_dir: &Path) -> PathBuf {
    version_dir.join(INSTALLING_MARKER)
}

/// Where the installer leaves the package's `package.toml` inside a version directory.
pub fn package_metadata_path(version_dir: &Path) -> PathBuf {
    version_dir.join(format!(".{PACKAGE_METADATA_FILE}"))
}

pub fn default_app_root(app_id: &str) -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows app root")?;
        return Ok(PathBuf::from(app_data).join(app_id));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve app root")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join(app_id))
}

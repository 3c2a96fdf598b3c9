use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use updraft_core::ReleaseVersion;

use crate::fs_utils::write_sentinel;
use crate::layout::{dead_sentinel_path, installing_marker_path, AppLayout, VERSION_DIR_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionDirState {
    /// Still being populated; never a candidate for "current".
    Installing,
    Installed,
    /// Carries the dead sentinel; contents may be partly gone.
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedDir {
    pub path: PathBuf,
    pub version: ReleaseVersion,
    pub state: VersionDirState,
}

impl VersionedDir {
    pub fn is_live(&self) -> bool {
        self.state != VersionDirState::Dead
    }
}

pub fn parse_version_dir_name(name: &str) -> Option<ReleaseVersion> {
    let raw = name.strip_prefix(VERSION_DIR_PREFIX)?;
    ReleaseVersion::parse(raw).ok()
}

pub fn version_dir_state(path: &Path) -> VersionDirState {
    if dead_sentinel_path(path).exists() {
        VersionDirState::Dead
    } else if installing_marker_path(path).exists() {
        VersionDirState::Installing
    } else {
        VersionDirState::Installed
    }
}

/// Lists every `app-<version>` directory under the root, oldest first.
pub fn scan_version_dirs(layout: &AppLayout) -> Result<Vec<VersionedDir>> {
    let root = layout.root();
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)
        .with_context(|| format!("failed to read app root: {}", root.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(version) = entry.file_name().to_str().and_then(parse_version_dir_name) else {
            continue;
        };
        let path = entry.path();
        let state = version_dir_state(&path);
        dirs.push(VersionedDir {
            path,
            version,
            state,
        });
    }
    dirs.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(dirs)
}

/// Highest fully installed, non-dead version directory. Recomputed from disk on every call.
pub fn current_version_dir(layout: &AppLayout) -> Result<Option<VersionedDir>> {
    Ok(scan_version_dirs(layout)?
        .into_iter()
        .rev()
        .find(|dir| dir.state == VersionDirState::Installed))
}

pub fn mark_dead(version_dir: &Path) -> Result<()> {
    write_sentinel(&dead_sentinel_path(version_dir))
}

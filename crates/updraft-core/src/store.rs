use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::UpdateError;
use crate::release::{parse_package_filename, ReleaseEntry, PACKAGE_EXTENSION};
use crate::version::ReleaseVersion;

pub const MANIFEST_FILE_NAME: &str = "RELEASES";

/// Ordered release entries backed by the plain-text manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseSet {
    entries: Vec<ReleaseEntry>,
}

impl ReleaseSet {
    pub fn new(mut entries: Vec<ReleaseEntry>) -> Self {
        entries.sort_by(|a, b| a.sort_order(b));
        entries.dedup_by(|a, b| a.filename == b.filename);
        Self { entries }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = ReleaseEntry::parse_line(line)
                .with_context(|| format!("invalid release manifest line {}", index + 1))?;
            entries.push(entry);
        }
        Ok(Self::new(entries))
    }

    pub fn render(&self) -> String {
        let mut payload = String::new();
        for entry in &self.entries {
            payload.push_str(&entry.to_line());
            payload.push('\n');
        }
        payload
    }

    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn latest_full(&self) -> Option<&ReleaseEntry> {
        self.entries.iter().rev().find(|entry| !entry.is_delta)
    }

    pub fn full_for_version(&self, version: &ReleaseVersion) -> Option<&ReleaseEntry> {
        self.entries
            .iter()
            .find(|entry| !entry.is_delta && entry.version == *version)
    }
}

pub fn manifest_path(package_dir: &Path) -> PathBuf {
    package_dir.join(MANIFEST_FILE_NAME)
}

/// Reads the manifest; a missing file is an empty release set.
pub fn read_release_set(package_dir: &Path) -> Result<ReleaseSet> {
    let path = manifest_path(package_dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ReleaseSet::default()),
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(UpdateError::ManifestUnreadable(path.display().to_string())));
        }
    };

    ReleaseSet::parse(&raw)
        .map_err(|err| err.context(UpdateError::ManifestUnreadable(path.display().to_string())))
}

pub fn write_release_set(package_dir: &Path, set: &ReleaseSet) -> Result<PathBuf> {
    fs::create_dir_all(package_dir)
        .with_context(|| format!("failed to create {}", package_dir.display()))?;

    let path = manifest_path(package_dir);
    let tmp = package_dir.join(format!("{MANIFEST_FILE_NAME}.tmp"));
    fs::write(&tmp, set.render().as_bytes())
        .with_context(|| format!("failed to write release manifest: {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .with_context(|| format!("failed to replace release manifest: {}", path.display()))?;
    Ok(path)
}

/// Lists package files physically present in the cache, sorted by name.
pub fn list_package_files(package_dir: &Path) -> Result<Vec<PathBuf>> {
    if !package_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(package_dir)
        .with_context(|| format!("failed to read package cache: {}", package_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(PACKAGE_EXTENSION))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Re-hashes every package in the cache and rewrites the manifest to match.
///
/// Files whose names do not follow the release naming scheme are left out.
pub fn rebuild_release_set(package_dir: &Path) -> Result<ReleaseSet> {
    let mut entries = Vec::new();
    for path in list_package_files(package_dir)? {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Err(err) = parse_package_filename(&name) {
            warn!(file = %path.display(), error = %format!("{err:#}"), "skipping unrecognized file in package cache");
            continue;
        }
        let entry = ReleaseEntry::from_package_file(&path)
            .with_context(|| format!("failed to index package file: {}", path.display()))?;
        entries.push(entry);
    }

    let set = ReleaseSet::new(entries);
    write_release_set(package_dir, &set)?;
    Ok(set)
}

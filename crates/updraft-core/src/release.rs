use std::cmp::Ordering;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::version::ReleaseVersion;

pub const PACKAGE_EXTENSION: &str = ".nupkg";
pub const FULL_SUFFIX: &str = "-full.nupkg";
pub const DELTA_SUFFIX: &str = "-delta.nupkg";

/// One distributable package as recorded in the release manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    pub sha256: String,
    pub filename: String,
    pub size: u64,
    pub version: ReleaseVersion,
    pub is_delta: bool,
}

impl ReleaseEntry {
    /// Builds an entry, deriving version and delta flag from the file name.
    pub fn new(sha256: impl Into<String>, filename: impl Into<String>, size: u64) -> Result<Self> {
        let filename = filename.into();
        let (_, version, is_delta) = parse_package_filename(&filename)?;
        Ok(Self {
            sha256: sha256.into().to_ascii_lowercase(),
            filename,
            size,
            version,
            is_delta,
        })
    }

    /// Hashes a package file on disk and describes it as a fresh entry.
    pub fn from_package_file(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("package path has no file name: {}", path.display()))?;
        let size = std::fs::metadata(path)
            .with_context(|| format!("failed to stat package file: {}", path.display()))?
            .len();
        let sha256 = updraft_security::sha256_file_hex(path)?;
        Self::new(sha256, filename, size)
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let parts = line.split_whitespace().collect::<Vec<_>>();
        if parts.len() != 3 {
            return Err(anyhow!(
                "release line must contain hash, filename and size: '{line}'"
            ));
        }

        let sha256 = parts[0];
        if sha256.len() != 64 || !sha256.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(anyhow!("release line has an invalid sha256: '{sha256}'"));
        }
        let size = parts[2]
            .parse::<u64>()
            .with_context(|| format!("release line has an invalid size: '{}'", parts[2]))?;
        Self::new(sha256, parts[1], size)
    }

    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.sha256, self.filename, self.size)
    }

    pub fn package_id(&self) -> &str {
        package_id_of(&self.filename).unwrap_or(&self.filename)
    }

    /// File name of the full package this entry produces or is.
    pub fn full_filename(&self) -> String {
        match self.filename.strip_suffix(DELTA_SUFFIX) {
            Some(stem) => format!("{stem}{FULL_SUFFIX}"),
            None => self.filename.clone(),
        }
    }

    pub fn sort_order(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then(self.is_delta.cmp(&other.is_delta))
            .then_with(|| self.filename.cmp(&other.filename))
    }
}

/// Splits `<id>-<version>-full.nupkg` or `<id>-<version>-delta.nupkg`.
pub fn parse_package_filename(filename: &str) -> Result<(String, ReleaseVersion, bool)> {
    let (stem, is_delta) = if let Some(stem) = filename.strip_suffix(DELTA_SUFFIX) {
        (stem, true)
    } else if let Some(stem) = filename.strip_suffix(FULL_SUFFIX) {
        (stem, false)
    } else {
        return Err(anyhow!(
            "package file name must end with '{FULL_SUFFIX}' or '{DELTA_SUFFIX}': {filename}"
        ));
    };

    let Some((id, version)) = stem.rsplit_once('-') else {
        return Err(anyhow!(
            "package file name is missing a version segment: {filename}"
        ));
    };
    if id.is_empty() {
        return Err(anyhow!("package file name is missing an id: {filename}"));
    }
    let version = ReleaseVersion::parse(version)
        .with_context(|| format!("invalid version in package file name: {filename}"))?;
    Ok((id.to_string(), version, is_delta))
}

fn package_id_of(filename: &str) -> Option<&str> {
    let stem = filename
        .strip_suffix(DELTA_SUFFIX)
        .or_else(|| filename.strip_suffix(FULL_SUFFIX))?;
    stem.rsplit_once('-').map(|(id, _)| id)
}

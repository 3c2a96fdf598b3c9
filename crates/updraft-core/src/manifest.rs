use std::collections::HashSet;

use anyhow::{anyhow, Context};
use semver::Version;
use serde::Deserialize;

use crate::version::ReleaseVersion;

pub const PACKAGE_METADATA_FILE: &str = "package.toml";

/// Metadata shipped at the root of every package as `package.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PackageMetadata {
    pub id: String,
    pub version: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub lifecycle_aware: Vec<String>,
    pub updater_protocol: Option<Version>,
}

impl PackageMetadata {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let metadata: Self =
            toml::from_str(input).context("failed to parse package metadata")?;
        if metadata.id.trim().is_empty() {
            return Err(anyhow!("package id must not be empty"));
        }
        if metadata.id.chars().any(|ch| ch.is_whitespace()) {
            return Err(anyhow!(
                "package id must not contain whitespace: '{}'",
                metadata.id
            ));
        }
        metadata.release_version().with_context(|| {
            format!("package '{}' has an invalid version", metadata.id)
        })?;

        let mut seen = HashSet::new();
        for exe in &metadata.lifecycle_aware {
            if exe.trim().is_empty() || exe.contains(['/', '\\']) {
                return Err(anyhow!(
                    "lifecycle_aware entries must be bare file names: '{exe}'"
                ));
            }
            if !seen.insert(exe.to_ascii_lowercase()) {
                return Err(anyhow!("duplicate lifecycle_aware entry '{exe}'"));
            }
        }
        Ok(metadata)
    }

    pub fn release_version(&self) -> anyhow::Result<ReleaseVersion> {
        ReleaseVersion::parse(&self.version)
    }

    pub fn is_lifecycle_aware(&self, exe_name: &str) -> bool {
        self.lifecycle_aware
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(exe_name))
    }
}

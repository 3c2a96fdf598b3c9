use std::path::PathBuf;

use crate::release::ReleaseEntry;
use crate::store::ReleaseSet;

/// Everything the apply pipeline needs to move from `current` to `target`.
///
/// `pending` is nearest-first: its first entry applies directly on top of
/// `current`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub current: Option<ReleaseEntry>,
    pub pending: Vec<ReleaseEntry>,
    pub target: Option<ReleaseEntry>,
    pub package_dir: PathBuf,
}

impl UpdateRequest {
    pub fn is_noop(&self) -> bool {
        self.pending.is_empty()
    }

    /// Plans an update from the releases available in the package cache.
    ///
    /// A contiguous delta chain starting right after `current` is preferred;
    /// otherwise the latest full package alone is pending.
    pub fn plan(
        current: Option<ReleaseEntry>,
        available: &ReleaseSet,
        package_dir: impl Into<PathBuf>,
    ) -> Self {
        let package_dir = package_dir.into();
        let newer = available
            .entries()
            .iter()
            .filter(|entry| {
                current
                    .as_ref()
                    .map_or(true, |current| entry.version > current.version)
            })
            .cloned()
            .collect::<Vec<_>>();

        let Some(latest) = newer.iter().map(|entry| entry.version).max() else {
            return Self {
                current,
                pending: Vec::new(),
                target: None,
                package_dir,
            };
        };

        let target = newer
            .iter()
            .find(|entry| !entry.is_delta && entry.version == latest)
            .or_else(|| newer.iter().find(|entry| entry.version == latest))
            .cloned();

        let mut versions = newer.iter().map(|entry| entry.version).collect::<Vec<_>>();
        versions.sort();
        versions.dedup();
        let deltas = versions
            .iter()
            .map(|version| {
                newer
                    .iter()
                    .find(|entry| entry.is_delta && entry.version == *version)
                    .cloned()
            })
            .collect::<Option<Vec<_>>>();

        let pending = match (&current, deltas) {
            (Some(_), Some(deltas)) if !deltas.is_empty() => deltas,
            _ => newer
                .iter()
                .rev()
                .find(|entry| !entry.is_delta)
                .cloned()
                .into_iter()
                .collect(),
        };

        Self {
            current,
            pending,
            target,
            package_dir,
        }
    }
}

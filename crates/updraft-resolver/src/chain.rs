use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use updraft_core::{ReleaseEntry, UpdateError};

use crate::delta::DeltaBuilder;

/// Folds pending releases into the single full package they lead to.
///
/// `pending` is nearest-first. Returns `Ok(None)` when there is nothing to
/// apply. A batch of full packages yields the highest version; a batch of
/// deltas is replayed on top of `base` one step at a time, writing each
/// intermediate full package into `package_dir`.
pub fn resolve_delta_chain(
    base: Option<&ReleaseEntry>,
    pending: &[ReleaseEntry],
    package_dir: &Path,
    builder: &dyn DeltaBuilder,
) -> Result<Option<ReleaseEntry>> {
    if pending.is_empty() {
        return Ok(None);
    }

    let delta_count = pending.iter().filter(|entry| entry.is_delta).count();
    if delta_count != 0 && delta_count != pending.len() {
        let names = pending
            .iter()
            .map(|entry| entry.filename.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(UpdateError::InvalidCombination(names).into());
    }

    if delta_count == 0 {
        return Ok(pending
            .iter()
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned());
    }

    let mut base = base
        .cloned()
        .ok_or_else(|| UpdateError::MissingBase(pending[0].filename.clone()))?;
    let mut remaining = pending;

    while let Some((delta, tail)) = remaining.split_first() {
        if delta.version <= base.version {
            return Err(anyhow!(
                "delta {} does not advance past base version {}",
                delta.filename,
                base.version
            ));
        }

        let base_path = package_dir.join(base.full_filename());
        if !base_path.exists() {
            return Err(UpdateError::MissingPackage(base_path.display().to_string()).into());
        }
        let delta_path = package_dir.join(&delta.filename);
        if !delta_path.exists() {
            return Err(UpdateError::MissingPackage(delta_path.display().to_string()).into());
        }

        let output = package_dir.join(delta.full_filename());
        info!(
            base = %base.version,
            delta = %delta.version,
            remaining = tail.len(),
            "applying delta package"
        );
        builder
            .apply_delta(&base_path, &delta_path, &output)
            .with_context(|| {
                format!(
                    "failed to apply delta {} onto {}",
                    delta.filename,
                    base_path.display()
                )
            })?;

        base = ReleaseEntry::from_package_file(&output)?;
        debug!(sha256 = %base.sha256, file = %base.filename, "re-derived intermediate release");
        remaining = tail;
    }

    Ok(Some(base))
}

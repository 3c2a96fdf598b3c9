use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use zstd::dict::{DecoderDictionary, EncoderDictionary};

use crate::archive::{read_package_entries, write_package_entries, PackageEntries, PackageFile};

const NEW_PREFIX: &str = "new/";
const SAME_PREFIX: &str = "same/";
const DIFF_PREFIX: &str = "diff/";
const DELTA_COMPRESSION_LEVEL: i32 = 19;

/// Synthesizes a full package from a base full package plus a delta package.
pub trait DeltaBuilder: Send + Sync {
    fn apply_delta(&self, base_package: &Path, delta_package: &Path, output: &Path)
        -> Result<()>;
}

/// Delta packages whose changed files are zstd streams compressed against the
/// base file as a raw-content dictionary.
///
/// Layout of a delta package:
/// - `new/<path>`: file added in the new version, stored whole
/// - `same/<path>`: file unchanged from the base (empty marker)
/// - `diff/<path>`: zstd stream that decodes to the new file given the base file
///
/// Every delta entry carries the new file's unix mode. Base files with no
/// counterpart are dropped from the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdDeltaBuilder;

impl ZstdDeltaBuilder {
    pub fn create_delta_package(
        &self,
        base_package: &Path,
        new_package: &Path,
        output: &Path,
    ) -> Result<()> {
        let base = read_package_entries(base_package)?;
        let target = read_package_entries(new_package)?;

        let mut delta = PackageEntries::new();
        for (name, file) in &target {
            match base.get(name) {
                Some(old) if old.data == file.data => {
                    delta.insert(
                        format!("{SAME_PREFIX}{name}"),
                        PackageFile::with_mode(Vec::new(), file.mode),
                    );
                }
                Some(old) => {
                    let patch = generate_patch(&old.data, &file.data)
                        .with_context(|| format!("failed to diff package entry {name}"))?;
                    delta.insert(
                        format!("{DIFF_PREFIX}{name}"),
                        PackageFile::with_mode(patch, file.mode),
                    );
                }
                None => {
                    delta.insert(format!("{NEW_PREFIX}{name}"), file.clone());
                }
            }
        }

        write_package_entries(output, &delta)
    }
}

impl DeltaBuilder for ZstdDeltaBuilder {
    fn apply_delta(&self, base_package: &Path, delta_package: &Path, output: &Path) -> Result<()> {
        let base = read_package_entries(base_package)?;
        let delta = read_package_entries(delta_package)?;

        let mut rebuilt = PackageEntries::new();
        for (name, entry) in delta {
            if let Some(path) = name.strip_prefix(NEW_PREFIX) {
                rebuilt.insert(path.to_string(), entry);
            } else if let Some(path) = name.strip_prefix(SAME_PREFIX) {
                let old = base.get(path).ok_or_else(|| {
                    anyhow!(
                        "delta {} keeps '{path}' but the base package {} has no such file",
                        delta_package.display(),
                        base_package.display()
                    )
                })?;
                rebuilt.insert(
                    path.to_string(),
                    PackageFile::with_mode(old.data.clone(), entry.mode),
                );
            } else if let Some(path) = name.strip_prefix(DIFF_PREFIX) {
                let old = base.get(path).ok_or_else(|| {
                    anyhow!(
                        "delta {} patches '{path}' but the base package {} has no such file",
                        delta_package.display(),
                        base_package.display()
                    )
                })?;
                let patched = apply_patch(&old.data, &entry.data)
                    .with_context(|| format!("failed to patch package entry {path}"))?;
                rebuilt.insert(path.to_string(), PackageFile::with_mode(patched, entry.mode));
            } else {
                return Err(anyhow!(
                    "delta {} contains an unrecognized entry: {name}",
                    delta_package.display()
                ));
            }
        }

        debug!(
            base = %base_package.display(),
            delta = %delta_package.display(),
            files = rebuilt.len(),
            "rebuilt full package from delta"
        );
        write_package_entries(output, &rebuilt)
    }
}

fn generate_patch(old_data: &[u8], new_data: &[u8]) -> Result<Vec<u8>> {
    let dict = EncoderDictionary::copy(old_data, DELTA_COMPRESSION_LEVEL);
    let mut encoder = zstd::stream::Encoder::with_prepared_dictionary(Vec::new(), &dict)?;
    encoder.write_all(new_data)?;
    Ok(encoder.finish()?)
}

fn apply_patch(old_data: &[u8], patch_data: &[u8]) -> Result<Vec<u8>> {
    let dict = DecoderDictionary::copy(old_data);
    let mut decoder = zstd::stream::Decoder::with_prepared_dictionary(patch_data, &dict)?;
    let mut decompressed = Vec::new();
    std::io::copy(&mut decoder, &mut decompressed)?;
    Ok(decompressed)
}

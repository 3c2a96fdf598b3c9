use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Permission bits given to entries that carry no unix mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const EXECUTABLE_FILE_MODE: u32 = 0o755;

/// One file inside a package together with its unix permission bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub mode: u32,
    pub data: Vec<u8>,
}

impl PackageFile {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self::with_mode(data, DEFAULT_FILE_MODE)
    }

    pub fn executable(data: impl Into<Vec<u8>>) -> Self {
        Self::with_mode(data, EXECUTABLE_FILE_MODE)
    }

    pub fn with_mode(data: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            mode: mode & 0o777,
            data: data.into(),
        }
    }
}

/// In-memory view of a package: archive-relative path to file.
pub type PackageEntries = BTreeMap<String, PackageFile>;

pub fn read_package_entries(path: &Path) -> Result<PackageEntries> {
    let file = File::open(path)
        .with_context(|| format!("failed to open package: {}", path.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read package archive: {}", path.display()))?;

    let mut entries = PackageEntries::new();
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .with_context(|| format!("failed to read entry {index} of {}", path.display()))?;
        if file.is_dir() {
            continue;
        }
        let Some(name) = file.enclosed_name().map(|name| normalize_entry_name(&name)) else {
            return Err(anyhow!(
                "package {} contains an unsafe entry path: {}",
                path.display(),
                file.name()
            ));
        };

        let mode = file.unix_mode().unwrap_or(DEFAULT_FILE_MODE);
        let mut payload = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut payload)
            .with_context(|| format!("failed to read {name} from {}", path.display()))?;
        entries.insert(name, PackageFile::with_mode(payload, mode));
    }
    Ok(entries)
}

/// Writes entries in sorted order with fixed timestamps, so identical
/// content and modes always produce identical package bytes.
pub fn write_package_entries(path: &Path, entries: &PackageEntries) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let tmp = path.with_extension("partial");
    let file =
        File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for (name, file) in entries {
        writer
            .start_file(name.as_str(), options.unix_permissions(file.mode))
            .with_context(|| format!("failed to start entry {name} in {}", tmp.display()))?;
        writer
            .write_all(&file.data)
            .with_context(|| format!("failed to write entry {name} in {}", tmp.display()))?;
    }

    let mut inner = writer
        .finish()
        .with_context(|| format!("failed to finish package archive: {}", tmp.display()))?;
    inner
        .flush()
        .with_context(|| format!("failed to flush package archive: {}", tmp.display()))?;
    drop(inner);

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to move package {} into place at {}",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

fn normalize_entry_name(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

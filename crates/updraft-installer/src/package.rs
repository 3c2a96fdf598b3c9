use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use updraft_core::{ReleaseEntry, UpdateError, PACKAGE_METADATA_FILE};
use updraft_security::verify_sha256_file;
use walkdir::WalkDir;

use crate::fs_utils::remove_file_if_exists;
use crate::interop::PackageExtractor;
use crate::layout::{installing_marker_path, package_metadata_path, AppLayout};

const PAYLOAD_ROOT: &str = "lib/";
const LIB_DIR: &str = "lib";

/// Installs a full package into a fresh `app-<version>` directory and returns its path.
///
/// Any directory already present for that version is leftover from an
/// interrupted install and is deleted first.
pub fn install_package(
    layout: &AppLayout,
    entry: &ReleaseEntry,
    package_dir: &Path,
    extractor: &dyn PackageExtractor,
) -> Result<PathBuf> {
    if entry.is_delta {
        return Err(anyhow!(
            "delta package {} must be resolved before it can be installed",
            entry.filename
        ));
    }
    let package = package_dir.join(&entry.filename);
    if !package.exists() {
        return Err(UpdateError::MissingPackage(package.display().to_string()).into());
    }
    verify_sha256_file(&package, &entry.sha256)
        .with_context(|| format!("refusing to install {}", entry.filename))?;

    let target = layout.version_dir(&entry.version);
    if target.exists() {
        info!(path = %target.display(), "removing leftover version directory");
        fs::remove_dir_all(&target).with_context(|| {
            format!(
                "failed to remove leftover version directory: {}",
                target.display()
            )
        })?;
    }
    fs::create_dir_all(&target)
        .with_context(|| format!("failed to create version directory: {}", target.display()))?;
    let marker = installing_marker_path(&target);
    fs::write(&marker, b"")
        .with_context(|| format!("failed to write install marker: {}", marker.display()))?;

    let lib_dir = target.join(LIB_DIR);
    let extracted = extractor
        .extract_prefix(&package, PAYLOAD_ROOT, &lib_dir)
        .with_context(|| format!("failed to extract package {}", package.display()))?;
    debug!(package = %entry.filename, files = extracted, "extracted package payload");

    if let Some(metadata) = extractor.read_entry(&package, PACKAGE_METADATA_FILE)? {
        let path = package_metadata_path(&target);
        fs::write(&path, metadata)
            .with_context(|| format!("failed to write package metadata: {}", path.display()))?;
    }

    flatten_lib_tree(&lib_dir, &target)?;
    if lib_dir.exists() {
        fs::remove_dir_all(&lib_dir)
            .with_context(|| format!("failed to remove library tree: {}", lib_dir.display()))?;
    }

    remove_file_if_exists(&marker)
        .with_context(|| format!("failed to remove install marker: {}", marker.display()))?;
    info!(version = %entry.version, path = %target.display(), "installed package");
    Ok(target)
}

/// Moves the contents of every platform folder under `lib_dir` into `target`.
///
/// Folders are processed in lexicographic order, so a file from a later
/// folder replaces a same-named file from an earlier one.
pub fn flatten_lib_tree(lib_dir: &Path, target: &Path) -> Result<()> {
    if !lib_dir.exists() {
        return Ok(());
    }

    let mut loose_files = Vec::new();
    let mut platform_dirs = Vec::new();
    for entry in fs::read_dir(lib_dir)
        .with_context(|| format!("failed to read library tree: {}", lib_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            platform_dirs.push(entry.path());
        } else {
            loose_files.push(entry.path());
        }
    }
    platform_dirs.sort();
    loose_files.sort();

    for file in loose_files {
        let Some(name) = file.file_name() else {
            continue;
        };
        move_replacing(&file, &target.join(name))?;
    }

    for platform_dir in platform_dirs {
        debug!(folder = %platform_dir.display(), "flattening platform folder");
        for entry in WalkDir::new(&platform_dir).sort_by_file_name() {
            let entry = entry.with_context(|| {
                format!("failed to walk platform folder: {}", platform_dir.display())
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&platform_dir)
                .with_context(|| format!("unexpected path {}", entry.path().display()))?;
            move_replacing(entry.path(), &target.join(relative))?;
        }
    }
    Ok(())
}

fn move_replacing(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    remove_file_if_exists(dst)
        .with_context(|| format!("failed to replace existing file: {}", dst.display()))?;
    fs::rename(src, dst)
        .with_context(|| format!("failed to move {} to {}", src.display(), dst.display()))
}

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use updraft_core::UpdaterConfig;

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Bounded synchronous retry schedule for deleting directories that may be
/// held open by another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self {
            attempts: config.delete_retries.max(1),
            interval: config.delete_retry_interval(),
        }
    }
}

/// Filesystem seam used for every directory deletion.
pub trait DirRemover: Send + Sync {
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn delete_on_reboot(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirRemover;

impl DirRemover for FsDirRemover {
    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn delete_on_reboot(&self, path: &Path) -> Result<()> {
        schedule_delete_on_reboot(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    DeferredToReboot,
    Stuck,
}

pub fn delete_dir_with_retries(
    path: &Path,
    policy: RetryPolicy,
    remover: &dyn DirRemover,
) -> DeleteOutcome {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if !path.exists() {
            return DeleteOutcome::Removed;
        }
        match remover.remove_dir(path) {
            Ok(()) => return DeleteOutcome::Removed,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return DeleteOutcome::Removed,
            Err(err) => {
                debug!(
                    path = %path.display(),
                    attempt,
                    attempts,
                    error = %err,
                    "directory deletion failed"
                );
                if attempt < attempts {
                    std::thread::sleep(policy.interval);
                }
            }
        }
    }

    match remover.delete_on_reboot(path) {
        Ok(()) => {
            warn!(path = %path.display(), "directory is locked, deletion deferred until reboot");
            DeleteOutcome::DeferredToReboot
        }
        Err(err) => {
            warn!(path = %path.display(), error = %format!("{err:#}"), "could not delete directory");
            DeleteOutcome::Stuck
        }
    }
}

#[cfg(windows)]
pub fn schedule_delete_on_reboot(path: &Path) -> Result<()> {
    use std::process::Command;

    let digest = updraft_security::sha256_hex(path.display().to_string().as_bytes());
    let value_name = format!("updraft-cleanup-{}", &digest[..16]);
    let command_line = format!("cmd.exe /c rmdir /s /q \"{}\"", path.display());
    let output = Command::new("reg")
        .args([
            "add",
            r"HKCU\Software\Microsoft\Windows\CurrentVersion\RunOnce",
            "/v",
            &value_name,
            "/t",
            "REG_SZ",
            "/d",
            &command_line,
            "/f",
        ])
        .output()
        .context("failed to schedule deletion on reboot: command failed to start")?;
    if output.status.success() {
        return Ok(());
    }
    Err(anyhow!(
        "failed to schedule deletion on reboot for {}: status={} stderr='{}'",
        path.display(),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}

#[cfg(not(windows))]
pub fn schedule_delete_on_reboot(path: &Path) -> Result<()> {
    Err(anyhow!(
        "deferred deletion is not available on this platform: {}",
        path.display()
    ))
}

pub fn write_sentinel(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, b"").with_context(|| format!("failed to write sentinel: {}", path.display()))
}

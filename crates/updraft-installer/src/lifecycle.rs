use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, warn};
use updraft_core::{PackageMetadata, ReleaseVersion};

use crate::interop::{ProcessLauncher, VersionResourceReader};
use crate::layout::{package_metadata_path, UPDATER_BINARY_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Install,
    Updated,
    Obsolete,
    Uninstall,
    FirstRun,
}

impl HookKind {
    pub fn flag(self) -> &'static str {
        match self {
            Self::Install => "--updraft-install",
            Self::Updated => "--updraft-updated",
            Self::Obsolete => "--updraft-obsolete",
            Self::Uninstall => "--updraft-uninstall",
            Self::FirstRun => "--updraft-firstrun",
        }
    }

    pub fn arguments(self, version: &ReleaseVersion) -> Vec<String> {
        match self {
            Self::FirstRun => vec![self.flag().to_string()],
            _ => vec![self.flag().to_string(), version.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookStatus {
    Succeeded,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub executable: PathBuf,
    pub status: HookStatus,
}

impl HookOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == HookStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstRunLaunch {
    pub executable: PathBuf,
    pub error: Option<String>,
}

/// Receives the result of a detached first-run launch.
#[derive(Debug)]
pub struct FirstRunHandle {
    rx: oneshot::Receiver<Vec<FirstRunLaunch>>,
}

impl FirstRunHandle {
    pub async fn outcome(self) -> Result<Vec<FirstRunLaunch>> {
        self.rx
            .await
            .map_err(|_| anyhow!("first-run launch task ended without reporting"))
    }
}

/// Runs lifecycle hooks one executable at a time.
#[derive(Clone)]
pub struct HookRunner {
    launcher: Arc<dyn ProcessLauncher>,
    queue: Arc<Semaphore>,
}

impl HookRunner {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            queue: Arc::new(Semaphore::new(1)),
        }
    }

    /// Invokes every executable with `arguments`, each bounded by `timeout`.
    ///
    /// Failures and timeouts are logged and reported per executable; they
    /// never stop the rest of the batch.
    pub async fn invoke(
        &self,
        arguments: &[String],
        executables: &[PathBuf],
        timeout: Duration,
    ) -> Vec<HookOutcome> {
        let mut outcomes = Vec::with_capacity(executables.len());
        for executable in executables {
            let status = match self.queue.acquire().await {
                Ok(_permit) => self.run_one(executable, arguments, timeout).await,
                Err(_) => HookStatus::Failed("hook queue is closed".to_string()),
            };
            outcomes.push(HookOutcome {
                executable: executable.clone(),
                status,
            });
        }
        outcomes
    }

    async fn run_one(&self, executable: &Path, arguments: &[String], timeout: Duration) -> HookStatus {
        let working_dir = executable.parent().unwrap_or_else(|| Path::new("."));
        debug!(executable = %executable.display(), args = ?arguments, "running lifecycle hook");
        match tokio::time::timeout(
            timeout,
            self.launcher.run(executable, arguments, working_dir),
        )
        .await
        {
            Ok(Ok(0)) => HookStatus::Succeeded,
            Ok(Ok(code)) => {
                warn!(executable = %executable.display(), code, "lifecycle hook exited with failure");
                HookStatus::Failed(format!("exit code {code}"))
            }
            Ok(Err(err)) => {
                warn!(executable = %executable.display(), error = %format!("{err:#}"), "lifecycle hook failed");
                HookStatus::Failed(format!("{err:#}"))
            }
            Err(_) => {
                warn!(
                    executable = %executable.display(),
                    timeout_ms = timeout.as_millis() as u64,
                    "lifecycle hook timed out and was killed"
                );
                HookStatus::TimedOut
            }
        }
    }

    /// Starts the first-run launch on a detached task and returns immediately.
    pub fn launch_first_run(&self, executables: Vec<PathBuf>) -> FirstRunHandle {
        let (tx, rx) = oneshot::channel();
        let launcher = Arc::clone(&self.launcher);
        let args = HookKind::FirstRun.arguments(&ReleaseVersion::default());
        tokio::spawn(async move {
            let mut launches = Vec::with_capacity(executables.len());
            for executable in executables {
                let working_dir = executable
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                let error = match launcher.spawn_detached(&executable, &args, &working_dir).await {
                    Ok(()) => {
                        info!(executable = %executable.display(), "launched first run");
                        None
                    }
                    Err(err) => {
                        warn!(executable = %executable.display(), error = %format!("{err:#}"), "first-run launch failed");
                        Some(format!("{err:#}"))
                    }
                };
                launches.push(FirstRunLaunch { executable, error });
            }
            let _ = tx.send(launches);
        });
        FirstRunHandle { rx }
    }
}

/// Top-level executables of a version directory, excluding the updater.
pub fn list_executables(version_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut executables = Vec::new();
    for entry in fs::read_dir(version_dir)
        .with_context(|| format!("failed to read version directory: {}", version_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.eq_ignore_ascii_case(UPDATER_BINARY_NAME) || name.starts_with('.') {
            continue;
        }
        if is_executable(&path, name)? {
            executables.push(path);
        }
    }
    executables.sort();
    Ok(executables)
}

fn is_executable(path: &Path, name: &str) -> Result<bool> {
    if name.to_ascii_lowercase().ends_with(".exe") {
        return Ok(true);
    }
    has_exec_bit(path)
}

#[cfg(unix)]
fn has_exec_bit(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .permissions()
        .mode();
    Ok(mode & 0o111 != 0)
}

#[cfg(not(unix))]
fn has_exec_bit(_path: &Path) -> Result<bool> {
    Ok(false)
}

/// Reads the metadata the installer copied into a version directory.
pub fn read_installed_metadata(version_dir: &Path) -> Result<Option<PackageMetadata>> {
    let path = package_metadata_path(version_dir);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read package metadata: {}", path.display()))?;
    PackageMetadata::from_toml_str(&raw)
        .map(Some)
        .with_context(|| format!("invalid package metadata: {}", path.display()))
}

/// Executables in `version_dir` that opted in to lifecycle hooks.
pub fn lifecycle_aware_executables(
    version_dir: &Path,
    metadata: Option<&PackageMetadata>,
    resources: &dyn VersionResourceReader,
) -> Result<Vec<PathBuf>> {
    let mut aware = Vec::new();
    for executable in list_executables(version_dir)? {
        let name = executable
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let declared = metadata.is_some_and(|metadata| metadata.is_lifecycle_aware(name));
        let flagged = match resources.read(&executable) {
            Ok(resource) => resource
                .and_then(|resource| resource.lifecycle_aware)
                .is_some_and(|value| !value.trim().is_empty()),
            Err(err) => {
                debug!(executable = %executable.display(), error = %format!("{err:#}"), "could not read version resource");
                false
            }
        };
        if declared || flagged {
            aware.push(executable);
        }
    }
    Ok(aware)
}

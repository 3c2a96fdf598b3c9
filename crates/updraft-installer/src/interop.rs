//! Traits for everything the engine delegates to the OS or to file formats,
//! each with the implementation used outside of tests.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use updraft_core::ShortcutRecord;
use zip::ZipArchive;

pub trait PackageExtractor: Send + Sync {
    /// Extracts every entry whose archive path starts with `prefix` into
    /// `dest`, with the prefix stripped. Returns the number of files written.
    fn extract_prefix(&self, package: &Path, prefix: &str, dest: &Path) -> Result<usize>;

    fn read_entry(&self, package: &Path, name: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackageExtractor;

impl ZipPackageExtractor {
    fn open(package: &Path) -> Result<ZipArchive<BufReader<File>>> {
        let file = File::open(package)
            .with_context(|| format!("failed to open package: {}", package.display()))?;
        ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("failed to read package archive: {}", package.display()))
    }
}

impl PackageExtractor for ZipPackageExtractor {
    fn extract_prefix(&self, package: &Path, prefix: &str, dest: &Path) -> Result<usize> {
        let mut archive = Self::open(package)?;
        fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;

        let mut written = 0;
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .with_context(|| format!("failed to read entry {index} of {}", package.display()))?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = entry.enclosed_name() else {
                return Err(anyhow!(
                    "package {} contains an unsafe entry path: {}",
                    package.display(),
                    entry.name()
                ));
            };
            let Ok(relative) = name.strip_prefix(prefix.trim_end_matches('/')) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }

            let output = dest.join(relative);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut file = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            io::copy(&mut entry, &mut file)
                .with_context(|| format!("failed to extract {}", output.display()))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&output, fs::Permissions::from_mode(mode & 0o7777))
                    .with_context(|| format!("failed to set mode on {}", output.display()))?;
            }
            written += 1;
        }
        Ok(written)
    }

    fn read_entry(&self, package: &Path, name: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = Self::open(package)?;
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read {name} from {}", package.display())
                })
            }
        };
        let mut payload = Vec::new();
        entry
            .read_to_end(&mut payload)
            .with_context(|| format!("failed to read {name} from {}", package.display()))?;
        Ok(Some(payload))
    }
}

/// Strings from an executable's embedded version resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionResource {
    pub product_name: Option<String>,
    pub company_name: Option<String>,
    pub file_description: Option<String>,
    pub lifecycle_aware: Option<String>,
}

pub trait VersionResourceReader: Send + Sync {
    fn read(&self, executable: &Path) -> Result<Option<VersionResource>>;
}

/// Reader for platforms or builds without native resource parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVersionResources;

impl VersionResourceReader for NoVersionResources {
    fn read(&self, _executable: &Path) -> Result<Option<VersionResource>> {
        Ok(None)
    }
}

pub trait ShellLinks: Send + Sync {
    fn save(&self, link: &Path, record: &ShortcutRecord) -> Result<()>;

    fn load(&self, link: &Path) -> Result<ShortcutRecord>;

    /// Drops the OS-level pin for `link` and removes the link file.
    fn unpin(&self, link: &Path) -> Result<()>;
}

/// Link files stored as TOML documents with the `.lnk` extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlShellLinks;

impl ShellLinks for TomlShellLinks {
    fn save(&self, link: &Path, record: &ShortcutRecord) -> Result<()> {
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create shortcut dir: {}", parent.display()))?;
        }
        let payload = toml::to_string(record).context("failed to serialize shortcut")?;
        fs::write(link, payload.as_bytes())
            .with_context(|| format!("failed to write shortcut: {}", link.display()))
    }

    fn load(&self, link: &Path) -> Result<ShortcutRecord> {
        let raw = fs::read_to_string(link)
            .with_context(|| format!("failed to read shortcut: {}", link.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse shortcut: {}", link.display()))
    }

    fn unpin(&self, link: &Path) -> Result<()> {
        match fs::remove_file(link) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove pinned shortcut: {}", link.display()))
            }
        }
    }
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Runs `executable` to completion and returns its exit code.
    ///
    /// Dropping the returned future must stop the child process.
    async fn run(&self, executable: &Path, args: &[String], working_dir: &Path) -> Result<i32>;

    /// Starts `executable` without waiting for it.
    async fn spawn_detached(
        &self,
        executable: &Path,
        args: &[String],
        working_dir: &Path,
    ) -> Result<()>;

    /// Forcibly stops running processes whose image name matches one of `names`.
    async fn terminate_matching(&self, names: &[String], grace: Duration) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessLauncher;

#[async_trait]
impl ProcessLauncher for SystemProcessLauncher {
    async fn run(&self, executable: &Path, args: &[String], working_dir: &Path) -> Result<i32> {
        let mut child = Command::new(executable)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", executable.display()))?;
        let status = child
            .wait()
            .await
            .with_context(|| format!("failed to wait for {}", executable.display()))?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn spawn_detached(
        &self,
        executable: &Path,
        args: &[String],
        working_dir: &Path,
    ) -> Result<()> {
        let child = Command::new(executable)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", executable.display()))?;
        debug!(executable = %executable.display(), pid = ?child.id(), "started detached process");
        Ok(())
    }

    async fn terminate_matching(&self, names: &[String], grace: Duration) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            let mut command = if cfg!(windows) {
                let mut command = Command::new("taskkill");
                command.args(["/F", "/T", "/IM", name.as_str()]);
                command
            } else {
                let mut command = Command::new("pkill");
                command.args(["-KILL", "-x", name.as_str()]);
                command
            };
            let output = command
                .stdin(Stdio::null())
                .output()
                .await
                .with_context(|| format!("failed to run process termination for {name}"))?;
            debug!(name = %name, status = %output.status, "process termination requested");
        }
        tokio::time::sleep(grace).await;
        Ok(())
    }
}

/// Platform feature checks made once per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub supports_pinned_shortcuts: bool,
}

impl PlatformCapabilities {
    pub fn detect() -> Self {
        Self {
            supports_pinned_shortcuts: !cfg!(target_os = "macos"),
        }
    }
}

/// OS folders that shortcuts are written into and pins are searched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellFolders {
    pub desktop: PathBuf,
    pub start_menu: PathBuf,
    pub startup: PathBuf,
    pub taskbar: PathBuf,
}

impl ShellFolders {
    pub fn detect() -> Result<Self> {
        if cfg!(windows) {
            let app_data = std::env::var("APPDATA")
                .context("APPDATA is not set; cannot resolve shell folders")?;
            let profile = std::env::var("USERPROFILE")
                .context("USERPROFILE is not set; cannot resolve shell folders")?;
            let programs = PathBuf::from(&app_data)
                .join("Microsoft")
                .join("Windows")
                .join("Start Menu")
                .join("Programs");
            return Ok(Self {
                desktop: PathBuf::from(profile).join("Desktop"),
                startup: programs.join("Startup"),
                start_menu: programs,
                taskbar: PathBuf::from(app_data)
                    .join("Microsoft")
                    .join("Internet Explorer")
                    .join("Quick Launch")
                    .join("User Pinned")
                    .join("TaskBar"),
            });
        }

        let home = PathBuf::from(
            std::env::var("HOME").context("HOME is not set; cannot resolve shell folders")?,
        );
        let data_home = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local").join("share"));
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"));
        Ok(Self {
            desktop: home.join("Desktop"),
            start_menu: data_home.join("applications"),
            startup: config_home.join("autostart"),
            taskbar: data_home.join("updraft").join("pinned"),
        })
    }

    /// Folder set rooted under one directory.
    pub fn under(base: &Path) -> Self {
        Self {
            desktop: base.join("desktop"),
            start_menu: base.join("start-menu"),
            startup: base.join("startup"),
            taskbar: base.join("taskbar"),
        }
    }

    /// Roots scanned for pinned shortcuts.
    pub fn pin_search_roots(&self) -> Vec<PathBuf> {
        vec![
            self.taskbar.clone(),
            self.start_menu.clone(),
            self.desktop.clone(),
        ]
    }
}

/// Notification-area state the shell keeps per executable path.
pub trait TrayState: Send + Sync {
    /// Forgets tray entries for executables under `root` that are not in
    /// `executables`. Returns how many entries were dropped.
    fn remove_dead_entries(&self, root: &Path, executables: &[PathBuf]) -> Result<usize>;
}

/// Prunes the shell's `IconStreams` cache on Windows; nothing to do elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellTrayState;

#[cfg(windows)]
const TRAY_NOTIFY_KEY: &str =
    r"HKEY_CURRENT_USER\Software\Classes\Local Settings\Software\Microsoft\Windows\CurrentVersion\TrayNotify";

impl TrayState for ShellTrayState {
    #[cfg(windows)]
    fn remove_dead_entries(&self, root: &Path, executables: &[PathBuf]) -> Result<usize> {
        use std::process::Command;

        let output = Command::new("reg")
            .args(["query", TRAY_NOTIFY_KEY, "/v", "IconStreams"])
            .output()
            .context("failed to read tray icon cache: command failed to start")?;
        if !output.status.success() {
            debug!(status = %output.status, "tray icon cache is not present");
            return Ok(0);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let encoded = stdout
            .lines()
            .find(|line| line.contains("IconStreams"))
            .and_then(|line| line.split_whitespace().last())
            .ok_or_else(|| anyhow!("tray icon cache query returned no IconStreams value"))?;
        let blob = hex::decode(encoded).context("tray icon cache is not valid hex")?;

        let Some((pruned, removed)) = crate::tray::prune_icon_streams(&blob, root, executables)?
        else {
            return Ok(0);
        };

        let bytes = pruned
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(",");
        let script = format!(
            "REGEDIT4\r\n\r\n[{TRAY_NOTIFY_KEY}]\r\n\"IconStreams\"=hex:{bytes}\r\n"
        );
        let script_path = root.join("tray-icons.reg");
        fs::write(&script_path, script)
            .with_context(|| format!("failed to write {}", script_path.display()))?;
        let output = Command::new("reg")
            .arg("import")
            .arg(&script_path)
            .output()
            .context("failed to write tray icon cache: command failed to start");
        let _ = fs::remove_file(&script_path);
        let output = output?;
        if !output.status.success() {
            return Err(anyhow!(
                "failed to write tray icon cache: status={} stderr='{}'",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(removed)
    }

    #[cfg(not(windows))]
    fn remove_dead_entries(&self, _root: &Path, _executables: &[PathBuf]) -> Result<usize> {
        Ok(0)
    }
}

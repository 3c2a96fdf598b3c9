use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::shortcut::{ShortcutLocation, ShortcutLocations};

pub const CONFIG_FILE_NAME: &str = "updater.toml";

/// Tunables read from `updater.toml` in the app root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub hook_timeout_secs: u64,
    pub first_run_enabled: bool,
    pub delete_retries: u32,
    pub delete_retry_interval_ms: u64,
    pub process_kill_grace_ms: u64,
    pub default_shortcut_locations: Vec<String>,
    pub pinned_shortcuts: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            hook_timeout_secs: 15,
            first_run_enabled: true,
            delete_retries: 10,
            delete_retry_interval_ms: 100,
            process_kill_grace_ms: 500,
            default_shortcut_locations: vec![
                ShortcutLocation::Desktop.as_str().to_string(),
                ShortcutLocation::StartMenu.as_str().to_string(),
            ],
            pinned_shortcuts: true,
        }
    }
}

impl UpdaterConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse updater config")?;
        if config.delete_retries == 0 {
            return Err(anyhow!("delete_retries must be at least 1"));
        }
        config.shortcut_locations()?;
        Ok(config)
    }

    /// Loads the config file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw)
                .with_context(|| format!("invalid updater config: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read updater config: {}", path.display())),
        }
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    pub fn delete_retry_interval(&self) -> Duration {
        Duration::from_millis(self.delete_retry_interval_ms)
    }

    pub fn process_kill_grace(&self) -> Duration {
        Duration::from_millis(self.process_kill_grace_ms)
    }

    pub fn shortcut_locations(&self) -> anyhow::Result<ShortcutLocations> {
        ShortcutLocations::parse_list(&self.default_shortcut_locations.join(","))
    }
}

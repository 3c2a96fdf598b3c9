use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShortcutLocation {
    Desktop,
    StartMenu,
    Startup,
    AppRoot,
    Taskbar,
}

impl ShortcutLocation {
    pub const ALL: [ShortcutLocation; 5] = [
        Self::Desktop,
        Self::StartMenu,
        Self::Startup,
        Self::AppRoot,
        Self::Taskbar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::StartMenu => "start-menu",
            Self::Startup => "startup",
            Self::AppRoot => "app-root",
            Self::Taskbar => "taskbar",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "desktop" => Some(Self::Desktop),
            "start-menu" | "startmenu" => Some(Self::StartMenu),
            "startup" => Some(Self::Startup),
            "app-root" | "approot" => Some(Self::AppRoot),
            "taskbar" => Some(Self::Taskbar),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Desktop => 1,
            Self::StartMenu => 1 << 1,
            Self::Startup => 1 << 2,
            Self::AppRoot => 1 << 3,
            Self::Taskbar => 1 << 4,
        }
    }
}

impl fmt::Display for ShortcutLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of shortcut locations a single request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShortcutLocations(u8);

impl ShortcutLocations {
    pub const NONE: Self = Self(0);

    pub fn all() -> Self {
        ShortcutLocation::ALL.into_iter().collect()
    }

    pub fn contains(self, location: ShortcutLocation) -> bool {
        self.0 & location.bit() != 0
    }

    pub fn insert(&mut self, location: ShortcutLocation) {
        self.0 |= location.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = ShortcutLocation> {
        ShortcutLocation::ALL
            .into_iter()
            .filter(move |location| self.contains(*location))
    }

    /// Parses a comma separated list such as `desktop,start-menu`.
    pub fn parse_list(input: &str) -> anyhow::Result<Self> {
        let mut locations = Self::NONE;
        for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let location = ShortcutLocation::parse(token)
                .ok_or_else(|| anyhow!("unknown shortcut location '{token}'"))?;
            locations.insert(location);
        }
        Ok(locations)
    }
}

impl From<ShortcutLocation> for ShortcutLocations {
    fn from(value: ShortcutLocation) -> Self {
        Self(value.bit())
    }
}

impl FromIterator<ShortcutLocation> for ShortcutLocations {
    fn from_iter<T: IntoIterator<Item = ShortcutLocation>>(iter: T) -> Self {
        let mut locations = Self::NONE;
        for location in iter {
            locations.insert(location);
        }
        locations
    }
}

impl BitOr for ShortcutLocation {
    type Output = ShortcutLocations;

    fn bitor(self, rhs: Self) -> ShortcutLocations {
        ShortcutLocations(self.bit() | rhs.bit())
    }
}

impl BitOr<ShortcutLocation> for ShortcutLocations {
    type Output = ShortcutLocations;

    fn bitor(self, rhs: ShortcutLocation) -> ShortcutLocations {
        ShortcutLocations(self.0 | rhs.bit())
    }
}

impl BitOrAssign<ShortcutLocation> for ShortcutLocations {
    fn bitor_assign(&mut self, rhs: ShortcutLocation) {
        self.insert(rhs);
    }
}

/// Fields persisted in a shell link file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutRecord {
    pub target: PathBuf,
    pub working_directory: PathBuf,
    pub icon_path: PathBuf,
    #[serde(default)]
    pub icon_index: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub app_user_model_id: String,
}

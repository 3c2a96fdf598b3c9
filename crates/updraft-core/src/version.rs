use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context};

/// Four-component release version (`major.minor.build.revision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReleaseVersion {
    parts: [u32; 4],
}

impl ReleaseVersion {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            parts: [major, minor, build, revision],
        }
    }

    pub fn major(&self) -> u32 {
        self.parts[0]
    }

    pub fn minor(&self) -> u32 {
        self.parts[1]
    }

    pub fn build(&self) -> u32 {
        self.parts[2]
    }

    pub fn revision(&self) -> u32 {
        self.parts[3]
    }

    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("release version must not be empty"));
        }

        let segments = trimmed.split('.').collect::<Vec<_>>();
        if segments.len() > 4 {
            return Err(anyhow!(
                "release version has more than four components: {trimmed}"
            ));
        }

        let mut parts = [0_u32; 4];
        for (index, segment) in segments.iter().enumerate() {
            parts[index] = segment.parse::<u32>().with_context(|| {
                format!("invalid release version component '{segment}' in '{trimmed}'")
            })?;
        }
        Ok(Self { parts })
    }
}

impl FromStr for ReleaseVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, build, revision] = self.parts;
        if revision == 0 {
            write!(f, "{major}.{minor}.{build}")
        } else {
            write!(f, "{major}.{minor}.{build}.{revision}")
        }
    }
}

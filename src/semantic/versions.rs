//! Index version registry.
//!
//! One `versions.json` per storage root maps every version to a summary and
//! points at the latest one. Each version's artifacts live in `v<version>/`
//! under the same root.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::semantic::metadata::DateRange;
use crate::storage::{BackendLocal, StorageManager};

const REGISTRY_FILE: &str = "versions.json";

/// Three-part version identifier, ordered numerically by (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const INITIAL: Version = Version::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn next_patch(self) -> Result<Self, VersionError> {
        let patch = self
            .patch
            .checked_add(1)
            .ok_or(VersionError::Exhausted(self))?;
        Ok(Self { patch, ..self })
    }

    /// Directory name of this version under the storage root.
    pub fn dir_name(&self) -> String {
        format!("v{self}")
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let parts: Vec<&str> = s.split('.').collect();

        match parts.as_slice() {
            [major, minor, patch] => {
                let parse = |part: &str| {
                    part.parse::<u32>()
                        .map_err(|_| VersionError::InvalidVersion(s.to_string()))
                };
                Ok(Version::new(parse(major)?, parse(minor)?, parse(patch)?))
            }
            _ => Err(VersionError::InvalidVersion(s.to_string())),
        }
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Registry summary of one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub total_articles: usize,
    pub date_range: DateRange,
    /// Artifact directory, relative to the storage root
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRegistry {
    #[serde(default)]
    pub latest: Option<Version>,
    #[serde(default)]
    pub versions: BTreeMap<Version, VersionEntry>,
}

impl VersionRegistry {
    /// Numerically greatest registered version.
    pub fn greatest(&self) -> Option<Version> {
        self.versions.keys().next_back().copied()
    }

    /// Patch-increment of the greatest version, or `1.0.0` when empty.
    pub fn next_version(&self) -> Result<Version, VersionError> {
        match self.greatest() {
            Some(greatest) => greatest.next_patch(),
            None => Ok(Version::INITIAL),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid version '{0}', expected major.minor.patch")]
    InvalidVersion(String),

    #[error("retention must keep at least one version")]
    InvalidRetention,

    #[error("no patch version left after {0}")]
    Exhausted(Version),
}

/// Tracks index versions under an explicit storage root.
pub struct VersionManager {
    store: BackendLocal,
}

impl VersionManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            store: BackendLocal::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.store.base_dir
    }

    pub fn version_dir(&self, version: Version) -> PathBuf {
        self.store.path(&version.dir_name())
    }

    /// Read the registry; a missing file is an empty registry.
    pub fn registry(&self) -> Result<VersionRegistry, VersionError> {
        match self.store.read(REGISTRY_FILE) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(VersionRegistry::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// The version marked latest, or `1.0.0` when none is recorded.
    pub fn latest_version(&self) -> Result<Version, VersionError> {
        Ok(self.registry()?.latest.unwrap_or(Version::INITIAL))
    }

    pub fn next_version(&self) -> Result<Version, VersionError> {
        self.registry()?.next_version()
    }

    /// Upsert the entry and move `latest` to it.
    pub fn record_version(&self, version: Version, entry: VersionEntry) -> Result<(), VersionError> {
        let mut registry = self.registry()?;
        registry.versions.insert(version, entry);
        registry.latest = Some(version);
        self.write_registry(&registry)?;

        log::info!("recorded index version {version} as latest");
        Ok(())
    }

    /// All registered versions, ascending.
    pub fn list_versions(&self) -> Result<Vec<(Version, VersionEntry)>, VersionError> {
        Ok(self.registry()?.versions.into_iter().collect())
    }

    /// Keep the `keep_latest_n` numerically greatest versions, delete the rest.
    ///
    /// The registry is rewritten before artifacts are removed, so a crash can
    /// leave an orphaned directory but never a dangling registry entry.
    pub fn prune(&self, keep_latest_n: usize) -> Result<Vec<Version>, VersionError> {
        if keep_latest_n == 0 {
            return Err(VersionError::InvalidRetention);
        }

        let mut registry = self.registry()?;
        let excess = registry.versions.len().saturating_sub(keep_latest_n);
        if excess == 0 {
            return Ok(vec![]);
        }

        let removed: Vec<Version> = registry.versions.keys().take(excess).copied().collect();
        for version in &removed {
            registry.versions.remove(version);
        }

        if registry
            .latest
            .map_or(true, |latest| !registry.versions.contains_key(&latest))
        {
            registry.latest = registry.greatest();
        }

        self.write_registry(&registry)?;

        for version in &removed {
            self.store.delete_dir(&version.dir_name())?;
            log::info!("pruned index version {version}");
        }

        Ok(removed)
    }

    fn write_registry(&self, registry: &VersionRegistry) -> Result<(), VersionError> {
        let json = serde_json::to_vec_pretty(registry)?;
        self.store.write(REGISTRY_FILE, &json)?;
        Ok(())
    }
}

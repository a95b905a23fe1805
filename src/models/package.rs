use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PkgDbError, Result};

/// Separator used by package ids (`name;version;arch;repository`)
pub const PACKAGE_ID_SEPARATOR: char = ';';

/// Identity of a package within one rebuild cycle
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub repository: String,
}

impl PackageKey {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            repository: repository.into(),
        }
    }

    /// Render as a package id string
    pub fn to_package_id(&self) -> String {
        self.to_string()
    }

    /// Parse a `name;version;arch;repository` package id.
    ///
    /// The name must be non-empty; the remaining fields may be empty but must
    /// all be present.
    pub fn parse_package_id(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.split(PACKAGE_ID_SEPARATOR).collect();
        match parts.as_slice() {
            [name, version, arch, repository] if !name.is_empty() => {
                Ok(Self::new(*name, *version, *arch, *repository))
            }
            _ => Err(PkgDbError::InvalidPackageId(id.to_string())),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.name,
            self.version,
            self.arch,
            self.repository,
            sep = PACKAGE_ID_SEPARATOR
        )
    }
}

/// Installation state reported by the enumeration source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    Installed,
    Available,
    #[default]
    Unknown,
}

impl InstallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallState::Installed => "installed",
            InstallState::Available => "available",
            InstallState::Unknown => "unknown",
        }
    }
}

/// A single package as known to the database
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub key: PackageKey,
    #[serde(default)]
    pub summary: String,
    /// Size in bytes (download size for available packages, installed size otherwise)
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub install_state: InstallState,
    /// Opaque extra metadata from the backend
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PackageRecord {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            key: PackageKey::new(name, version, arch, repository),
            summary: String::new(),
            size: 0,
            install_state: InstallState::Unknown,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_install_state(mut self, state: InstallState) -> Self {
        self.install_state = state;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn version(&self) -> &str {
        &self.key.version
    }

    pub fn arch(&self) -> &str {
        &self.key.arch
    }

    pub fn repository(&self) -> &str {
        &self.key.repository
    }

    pub fn is_installed(&self) -> bool {
        self.install_state == InstallState::Installed
    }

    /// Approximate heap footprint, used for staging accounting
    pub fn approx_size_bytes(&self) -> usize {
        let key = &self.key;
        let metadata: usize = self.metadata.iter().map(|(k, v)| k.len() + v.len()).sum();
        std::mem::size_of::<Self>()
            + key.name.len()
            + key.version.len()
            + key.arch.len()
            + key.repository.len()
            + self.summary.len()
            + metadata
    }
}

/// Get current Unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//! Volume configuration.
//!
//! Values are layered lowest first: built-in defaults, an optional JSON
//! file, then `SDHOST_*` environment variables. Front-ends such as
//! `sdshell` apply their own flags on top.
//!
//! ```json
//! {
//!     "mount_point": "/media/mmcblk0p1",
//!     "mount_table": "/etc/mtab",
//!     "contain_paths": false
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Where the SD card is mounted on the reference board.
pub const DEFAULT_MOUNT_POINT: &str = "/media/mmcblk0p1";

/// Mount table consulted by `VolumeManager::begin`.
pub const DEFAULT_MOUNT_TABLE: &str = "/etc/mtab";

pub const ENV_MOUNT_POINT: &str = "SDHOST_MOUNT_POINT";
pub const ENV_MOUNT_TABLE: &str = "SDHOST_MOUNT_TABLE";
pub const ENV_CONTAIN_PATHS: &str = "SDHOST_CONTAIN_PATHS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Absolute host path the logical paths are resolved against.
    pub mount_point: PathBuf,
    /// File in `fstab(5)`/`mtab` format listing mounted filesystems.
    pub mount_table: PathBuf,
    /// Reject logical paths with a `..` segment.
    ///
    /// Off by default: logical paths are concatenated verbatim.
    pub contain_paths: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            contain_paths: false,
        }
    }
}

impl VolumeConfig {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            ..Self::default()
        }
    }

    pub fn with_mount_table(mut self, mount_table: impl Into<PathBuf>) -> Self {
        self.mount_table = mount_table.into();
        self
    }

    pub fn with_containment(mut self, contain_paths: bool) -> Self {
        self.contain_paths = contain_paths;
        self
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, StorageError> {
        let text = fs::read_to_string(path).map_err(|e| StorageError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;

        let config: VolumeConfig =
            serde_json::from_str(&text).map_err(|e| StorageError::Config {
                message: format!("failed to parse {}: {}", path.display(), e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Default config file location, `<config dir>/sdhost/config.json`.
    pub fn default_file_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sdhost").join("config.json"))
    }

    /// Defaults, then the default config file if it exists, then the
    /// environment.
    pub fn load() -> Result<Self, StorageError> {
        let base = match Self::default_file_location() {
            Some(path) if path.is_file() => {
                log::debug!("Loading volume config from {}", path.display());
                Self::from_json_file(&path)?
            }
            _ => Self::default(),
        };

        base.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay `SDHOST_*` variables supplied by `lookup`.
    ///
    /// Taking a lookup function keeps tests away from the process
    /// environment.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, StorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mount_point) = lookup(ENV_MOUNT_POINT) {
            self.mount_point = PathBuf::from(mount_point);
        }
        if let Some(mount_table) = lookup(ENV_MOUNT_TABLE) {
            self.mount_table = PathBuf::from(mount_table);
        }
        if let Some(contain) = lookup(ENV_CONTAIN_PATHS) {
            self.contain_paths = parse_flag(&contain).ok_or_else(|| StorageError::Config {
                message: format!("{} must be a boolean, got {:?}", ENV_CONTAIN_PATHS, contain),
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if !self.mount_point.is_absolute() {
            return Err(StorageError::Config {
                message: format!(
                    "mount point must be absolute, got {}",
                    self.mount_point.display()
                ),
            });
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

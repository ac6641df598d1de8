use crate::error::Result;
use crate::paths;
use crate::watchlist::DEFAULT_WATCHLIST_NAME;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

pub const DEFAULT_STORAGE_KEY: &str = "vibeapp_watchlists";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Key of the durable slot holding the watchlist collection.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Name given to the watchlist seeded on first run.
    #[serde(default = "default_watchlist_name")]
    pub default_watchlist_name: String,
}

fn default_version() -> u32 {
    1
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_watchlist_name() -> String {
    DEFAULT_WATCHLIST_NAME.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage_key: default_storage_key(),
            default_watchlist_name: default_watchlist_name(),
        }
    }
}

impl Config {
    /// Load `.watchlist/config.yaml`, falling back to defaults when the file
    /// does not exist. A present but malformed file is an error.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        match crate::io::read_if_exists(&path)? {
            Some(data) => Ok(serde_yaml::from_str(&data)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = paths::validate_storage_key(&self.storage_key) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            });
        }

        if self.default_watchlist_name.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "default_watchlist_name is blank; '{DEFAULT_WATCHLIST_NAME}' will be used"
                ),
            });
        }

        if self.version > default_version() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "config version {} is newer than this build understands ({})",
                    self.version,
                    default_version()
                ),
            });
        }

        warnings
    }

    /// The seeded watchlist name, with a blank setting falling back to the
    /// built-in default.
    pub fn effective_default_name(&self) -> &str {
        let name = self.default_watchlist_name.trim();
        if name.is_empty() {
            DEFAULT_WATCHLIST_NAME
        } else {
            name
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

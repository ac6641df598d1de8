use crate::error::{Result, WatchlistError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DATA_DIR: &str = ".watchlist";
pub const STORE_DIR: &str = ".watchlist/store";
pub const CONFIG_FILE: &str = ".watchlist/config.yaml";

pub const SLOT_EXTENSION: &str = "json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

pub fn store_dir(root: &Path) -> PathBuf {
    root.join(STORE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Location of the durable slot for `key` under `store_dir`.
pub fn slot_path(store_dir: &Path, key: &str) -> PathBuf {
    store_dir.join(format!("{key}.{SLOT_EXTENSION}"))
}

/// The user-wide root used when no project-local `.watchlist/` exists.
pub fn home_root() -> Result<PathBuf> {
    home::home_dir().ok_or(WatchlistError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Storage key validation
// ---------------------------------------------------------------------------

static KEY_RE: OnceLock<Regex> = OnceLock::new();

fn key_re() -> &'static Regex {
    KEY_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_\-]*$").unwrap())
}

/// Storage keys become file names, so they are restricted to a safe alphabet.
pub fn validate_storage_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > 64 || !key_re().is_match(key) {
        return Err(WatchlistError::InvalidStorageKey(key.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

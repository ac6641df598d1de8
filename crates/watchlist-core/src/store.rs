//! Durable persistence for the watchlist collection.
//!
//! The whole collection lives in a single slot, addressed by a fixed key:
//! - `FileSlot`: `<root>/.watchlist/store/<key>.json`, written atomically
//! - `MemorySlot`: an in-process map for embedding and tests
//!
//! The slot holds a versioned JSON record:
//!
//! ```json
//! { "version": 1, "watchlists": [ { "id": "...", "name": "...", "tickers": [] } ] }
//! ```
//!
//! A bare JSON array of watchlists (the unversioned layout) is still read.

use crate::config::Config;
use crate::error::{Result, WatchlistError};
use crate::watchlist::Watchlist;
use crate::{io, paths};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub const RECORD_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// A durable key-value location holding one serialized record per key.
pub trait Slot {
    /// Read the value stored under `key`, or `None` if nothing was ever written.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The slot directory for a watchlist root (`<root>/.watchlist/store`).
    pub fn for_root(root: &Path) -> Self {
        Self::new(paths::store_dir(root))
    }

    pub fn path(&self, key: &str) -> PathBuf {
        paths::slot_path(&self.dir, key)
    }
}

impl Slot for FileSlot {
    fn read(&self, key: &str) -> Result<Option<String>> {
        paths::validate_storage_key(key)?;
        io::read_if_exists(&self.path(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        paths::validate_storage_key(key)?;
        io::atomic_write(&self.path(key), value.as_bytes())
    }
}

/// In-process slot. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(key.into(), value.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Slot for MemorySlot {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.insert(key, value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record encoding
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Record<'a> {
    version: u32,
    watchlists: &'a [Watchlist],
}

pub fn encode(watchlists: &[Watchlist]) -> Result<String> {
    let record = Record {
        version: RECORD_VERSION,
        watchlists,
    };
    Ok(serde_json::to_string_pretty(&record)?)
}

/// Decode slot content. The flag is `true` when the content used the
/// unversioned array layout.
pub fn decode(data: &str) -> Result<(Vec<Watchlist>, bool)> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| WatchlistError::CorruptState(e.to_string()))?;

    match value {
        serde_json::Value::Array(_) => {
            let watchlists = serde_json::from_value(value)
                .map_err(|e| WatchlistError::CorruptState(e.to_string()))?;
            Ok((watchlists, true))
        }
        serde_json::Value::Object(mut record) => {
            let version = record
                .get("version")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| {
                    WatchlistError::CorruptState("record has no numeric 'version'".to_string())
                })?;
            if version > u64::from(RECORD_VERSION) {
                return Err(WatchlistError::UnsupportedVersion(
                    u32::try_from(version).unwrap_or(u32::MAX),
                ));
            }
            let lists = record.remove("watchlists").ok_or_else(|| {
                WatchlistError::CorruptState("record has no 'watchlists'".to_string())
            })?;
            let watchlists = serde_json::from_value(lists)
                .map_err(|e| WatchlistError::CorruptState(e.to_string()))?;
            Ok((watchlists, false))
        }
        other => Err(WatchlistError::CorruptState(format!(
            "expected a record or an array, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Bring a decoded collection back in line with the model invariants.
/// Returns the number of fixes applied.
fn repair(watchlists: &mut Vec<Watchlist>, default_name: &str) -> usize {
    let mut fixes = 0;
    let mut seen_ids = HashSet::new();

    watchlists.retain(|w| {
        if w.id.trim().is_empty() || !seen_ids.insert(w.id.clone()) {
            warn!(id = %w.id, name = %w.name, "dropping watchlist with missing or duplicate id");
            fixes += 1;
            false
        } else {
            true
        }
    });

    for w in watchlists.iter_mut() {
        if w.name.trim().is_empty() {
            warn!(id = %w.id, "watchlist has a blank name; using default");
            w.name = default_name.to_string();
            fixes += 1;
        }

        let mut seen = HashSet::new();
        let before = w.tickers.len();
        w.tickers.retain(|t| seen.insert(t.clone()));
        if w.tickers.len() < before {
            warn!(id = %w.id, dropped = before - w.tickers.len(), "removed duplicate tickers");
            fixes += 1;
        }

        if w.updated_at < w.created_at {
            warn!(id = %w.id, "updatedAt precedes createdAt; clamping");
            w.updated_at = w.created_at;
            fixes += 1;
        }
    }

    fixes
}

// ---------------------------------------------------------------------------
// WatchlistStore
// ---------------------------------------------------------------------------

/// Where a loaded collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Read back exactly as stored.
    Stored,
    /// Read from the slot but upgraded or repaired; should be written back.
    Repaired,
    /// Nothing was stored; the default watchlist was seeded.
    Seeded,
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub watchlists: Vec<Watchlist>,
    pub source: LoadSource,
}

impl Loaded {
    pub fn needs_save(&self) -> bool {
        self.source != LoadSource::Stored
    }
}

/// Reads and writes the full watchlist collection under one slot key.
pub struct WatchlistStore {
    slot: Box<dyn Slot>,
    key: String,
    default_name: String,
}

impl WatchlistStore {
    pub fn new(
        slot: impl Slot + 'static,
        key: impl Into<String>,
        default_name: impl Into<String>,
    ) -> Self {
        Self {
            slot: Box::new(slot),
            key: key.into(),
            default_name: default_name.into(),
        }
    }

    /// File-backed store for `root`, keyed and seeded per `config`.
    pub fn open(root: &Path, config: &Config) -> Result<Self> {
        paths::validate_storage_key(&config.storage_key)?;
        Ok(Self::new(
            FileSlot::for_root(root),
            config.storage_key.clone(),
            config.effective_default_name(),
        ))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn seed_default(&self) -> Watchlist {
        Watchlist::seeded(&self.default_name)
    }

    /// Load the collection. A missing slot yields one seeded default
    /// watchlist; unreadable content fails with `CorruptState` (or
    /// `UnsupportedVersion`), which callers recover from by seeding.
    pub fn load(&self) -> Result<Vec<Watchlist>> {
        self.load_detailed().map(|loaded| loaded.watchlists)
    }

    pub fn load_detailed(&self) -> Result<Loaded> {
        let Some(data) = self.slot.read(&self.key)? else {
            info!(key = %self.key, "no stored watchlists; seeding default");
            return Ok(Loaded {
                watchlists: vec![self.seed_default()],
                source: LoadSource::Seeded,
            });
        };

        let (mut watchlists, legacy) = decode(&data)?;
        let fixes = repair(&mut watchlists, &self.default_name);
        let source = if legacy || fixes > 0 {
            LoadSource::Repaired
        } else {
            LoadSource::Stored
        };
        Ok(Loaded { watchlists, source })
    }

    /// Persist the full collection. Best effort: failures are logged and the
    /// caller's in-memory state stays authoritative.
    pub fn save(&self, watchlists: &[Watchlist]) {
        if let Err(e) = self.try_save(watchlists) {
            warn!(key = %self.key, error = %e, "failed to persist watchlists");
        }
    }

    pub fn try_save(&self, watchlists: &[Watchlist]) -> Result<()> {
        let data = encode(watchlists)?;
        self.slot.write(&self.key, &data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

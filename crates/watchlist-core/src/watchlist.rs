use crate::error::{Result, WatchlistError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_WATCHLIST_NAME: &str = "My Watchlist";

const ID_PREFIX: &str = "watchlist";

// ---------------------------------------------------------------------------
// Watchlist
// ---------------------------------------------------------------------------

/// A named, ordered set of ticker symbols.
///
/// `tickers` never holds the same symbol twice (exact, case-sensitive match)
/// and keeps insertion order, newest last. `updated_at` never moves behind
/// `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watchlist {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Watchlist {
    /// Build a new, empty watchlist. The name is trimmed and must not be blank.
    pub fn new(id: impl Into<String>, name: &str, description: Option<&str>) -> Result<Self> {
        let name = normalize_name(name)?;
        let now = Utc::now();
        Ok(Self {
            id: id.into(),
            name,
            description: description.and_then(normalize_description),
            tickers: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// The watchlist seeded on first run. A blank `name` falls back to
    /// [`DEFAULT_WATCHLIST_NAME`].
    pub fn seeded(name: &str) -> Self {
        let name = normalize_name(name).unwrap_or_else(|_| DEFAULT_WATCHLIST_NAME.to_string());
        let now = Utc::now();
        Self {
            id: generate_id(&[]),
            name,
            description: None,
            tickers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.tickers.iter().any(|t| t == ticker)
    }

    pub fn ticker_count(&self) -> usize {
        self.tickers.len()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Append a ticker. Returns `false` if already present (idempotent).
    pub fn add_ticker(&mut self, ticker: &str) -> Result<bool> {
        validate_ticker(ticker)?;
        if self.contains(ticker) {
            return Ok(false);
        }
        self.tickers.push(ticker.to_string());
        self.touch();
        Ok(true)
    }

    /// Remove a ticker. Returns `false` if it was not present.
    pub fn remove_ticker(&mut self, ticker: &str) -> bool {
        let before = self.tickers.len();
        self.tickers.retain(|t| t != ticker);
        if self.tickers.len() < before {
            self.touch();
            true
        } else {
            false
        }
    }

    /// Replace the name, and the description when one is given. An empty
    /// description clears it; `None` leaves it untouched.
    pub fn rename(&mut self, name: &str, description: Option<&str>) -> Result<()> {
        self.name = normalize_name(name)?;
        if let Some(d) = description {
            self.description = normalize_description(d);
        }
        self.touch();
        Ok(())
    }

    /// Refresh `updated_at`. Clamped so it never goes backwards, even if the
    /// wall clock does.
    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at).max(self.created_at);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Trim `name`, rejecting blank input.
pub fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WatchlistError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(description: &str) -> Option<String> {
    let trimmed = description.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

static TICKER_RE: OnceLock<Regex> = OnceLock::new();

fn ticker_re() -> &'static Regex {
    TICKER_RE.get_or_init(|| Regex::new(r"^\S{1,32}$").unwrap())
}

/// Tickers are stored exactly as given, so only their shape is checked:
/// 1-32 characters, no whitespace. The length cap and the whitespace ban are
/// this crate's own limits; the only hard requirement is a non-empty symbol.
pub fn validate_ticker(ticker: &str) -> Result<()> {
    if !ticker_re().is_match(ticker) {
        return Err(WatchlistError::InvalidTicker(ticker.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

/// `watchlist_<unix-millis>_<8 hex>`, regenerated until it is unused in
/// `existing`.
pub fn generate_id(existing: &[Watchlist]) -> String {
    loop {
        let random = uuid::Uuid::new_v4().simple().to_string();
        let id = format!(
            "{ID_PREFIX}_{}_{}",
            Utc::now().timestamp_millis(),
            &random[..8]
        );
        if !existing.iter().any(|w| w.id == id) {
            return id;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

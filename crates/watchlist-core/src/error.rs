use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("watchlist store not initialized: call init() first")]
    Uninitialized,

    #[error("invalid watchlist name {0:?}: must not be empty")]
    InvalidName(String),

    /// Empty ticker, or one outside the local 1-32 non-whitespace limit.
    #[error("invalid ticker {0:?}: must be 1-32 non-whitespace characters")]
    InvalidTicker(String),

    #[error("watchlist not found: {0}")]
    WatchlistNotFound(String),

    #[error("corrupt watchlist state: {0}")]
    CorruptState(String),

    #[error("unsupported watchlist record version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid storage key '{0}': must be lowercase alphanumeric with '-' or '_'")]
    InvalidStorageKey(String),

    #[error("home directory not found: set HOME or pass --root")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WatchlistError {
    /// Errors that mean the durable slot content cannot be trusted and the
    /// default collection should be seeded instead.
    pub fn is_corrupt_state(&self) -> bool {
        matches!(
            self,
            WatchlistError::CorruptState(_) | WatchlistError::UnsupportedVersion(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WatchlistError>;

pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod service;
pub mod store;
pub mod watchlist;

pub use error::{Result, WatchlistError};
pub use service::{Snapshot, Subscription, WatchlistService};
pub use store::{FileSlot, MemorySlot, Slot, WatchlistStore};
pub use watchlist::Watchlist;

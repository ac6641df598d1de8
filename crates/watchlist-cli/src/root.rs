use std::path::{Path, PathBuf};
use watchlist_core::paths;

/// Resolve the directory that holds `.watchlist/`.
///
/// Priority:
/// 1. `--root` flag / `WATCHLIST_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.watchlist/`
/// 3. The user's home directory
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Some(found) = find_data_dir(&cwd) {
        return found;
    }

    paths::home_root().unwrap_or(cwd)
}

fn find_data_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| paths::data_dir(dir).is_dir())
        .map(Path::to_path_buf)
}

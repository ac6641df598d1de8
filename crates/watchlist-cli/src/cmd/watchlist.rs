use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use watchlist_core::{config::Config, Watchlist, WatchlistError, WatchlistService, WatchlistStore};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Open the file-backed store under `root` and initialize a service on it.
pub fn open(root: &Path) -> anyhow::Result<WatchlistService> {
    let config = Config::load(root).context("failed to load config")?;
    let store = WatchlistStore::open(root, &config).context("failed to open watchlist store")?;
    let mut service = WatchlistService::new(store);
    service
        .subscribe(|snapshot| tracing::debug!(count = snapshot.len(), "watchlists changed"))
        .detach();
    service.init();
    Ok(service)
}

/// Resolve a user-supplied reference to a watchlist id. Accepts an exact id
/// or a watchlist name, as long as the name is unambiguous.
fn resolve(service: &WatchlistService, reference: &str) -> anyhow::Result<Watchlist> {
    if let Some(w) = service.get_watchlist(reference) {
        return Ok(w);
    }

    let lists = service
        .watchlists()
        .ok_or(WatchlistError::Uninitialized)?;
    let matches: Vec<&Watchlist> = lists.iter().filter(|w| w.name == reference).collect();
    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(WatchlistError::WatchlistNotFound(reference.to_string()).into()),
        many => {
            let ids: Vec<&str> = many.iter().map(|w| w.id.as_str()).collect();
            anyhow::bail!(
                "'{reference}' matches {} watchlists; use an id: {}",
                many.len(),
                ids.join(", ")
            )
        }
    }
}

fn summary(w: &Watchlist) -> serde_json::Value {
    serde_json::json!({
        "id": w.id,
        "name": w.name,
        "description": w.description,
        "ticker_count": w.ticker_count(),
        "updated_at": w.updated_at,
    })
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let service = open(root)?;
    let lists = service
        .watchlists()
        .ok_or(WatchlistError::Uninitialized)?;

    if json {
        let items: Vec<serde_json::Value> = lists.iter().map(summary).collect();
        print_json(&items)?;
        return Ok(());
    }

    if lists.is_empty() {
        println!("No watchlists.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = lists
        .iter()
        .map(|w| {
            vec![
                w.id.clone(),
                w.name.clone(),
                w.ticker_count().to_string(),
                w.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "TICKERS", "UPDATED"], &rows);
    Ok(())
}

pub fn show(root: &Path, reference: &str, json: bool) -> anyhow::Result<()> {
    let service = open(root)?;
    let w = resolve(&service, reference)?;

    if json {
        print_json(&w)?;
        return Ok(());
    }

    println!("Watchlist: {} ({})", w.name, w.id);
    if let Some(d) = &w.description {
        println!("About:     {d}");
    }
    println!("Created:   {}", w.created_at.to_rfc3339());
    println!("Updated:   {}", w.updated_at.to_rfc3339());
    println!("Tickers:   {}", w.ticker_count());
    if w.tickers.is_empty() {
        println!("  (none)");
    } else {
        for t in &w.tickers {
            println!("  {t}");
        }
    }
    Ok(())
}

pub fn check(root: &Path, ticker: &str, reference: Option<&str>, json: bool) -> anyhow::Result<()> {
    let service = open(root)?;
    let id = match reference {
        Some(r) => Some(resolve(&service, r)?.id),
        None => None,
    };
    let watched = service.is_in_watchlist(ticker, id.as_deref());

    if json {
        print_json(&serde_json::json!({
            "ticker": ticker,
            "watchlist": id,
            "watched": watched,
        }))?;
    } else {
        println!("{watched}");
    }
    Ok(())
}

pub fn which(root: &Path, ticker: &str, json: bool) -> anyhow::Result<()> {
    let service = open(root)?;
    let lists = service.get_watchlists_for_ticker(ticker);

    if json {
        let items: Vec<serde_json::Value> = lists.iter().map(summary).collect();
        print_json(&items)?;
        return Ok(());
    }

    if lists.is_empty() {
        println!("'{ticker}' is not in any watchlist.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = lists
        .iter()
        .map(|w| vec![w.id.clone(), w.name.clone()])
        .collect();
    print_table(&["ID", "NAME"], &rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

pub fn create(
    root: &Path,
    name: &str,
    description: Option<&str>,
    ticker: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut service = open(root)?;
    let created = match ticker {
        Some(t) => service.create_watchlist_with(name, description, t),
        None => service.create_watchlist(name, description),
    }
    .with_context(|| format!("failed to create watchlist '{name}'"))?;

    if json {
        print_json(&created)?;
    } else {
        println!("Created watchlist '{}' ({}).", created.name, created.id);
        if !created.tickers.is_empty() {
            println!("  Tickers: {}", created.tickers.join(", "));
        }
    }
    Ok(())
}

pub fn rename(
    root: &Path,
    reference: &str,
    name: &str,
    description: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut service = open(root)?;
    let target = resolve(&service, reference)?;
    service
        .rename_watchlist(&target.id, name, description)
        .with_context(|| format!("failed to rename watchlist '{}'", target.name))?;
    let renamed = service
        .get_watchlist(&target.id)
        .ok_or_else(|| WatchlistError::WatchlistNotFound(target.id.clone()))?;

    if json {
        print_json(&renamed)?;
    } else {
        println!("Renamed '{}' to '{}'.", target.name, renamed.name);
    }
    Ok(())
}

pub fn delete(root: &Path, reference: &str, json: bool) -> anyhow::Result<()> {
    let mut service = open(root)?;
    let target = resolve(&service, reference)?;
    let deleted = service.delete_watchlist(&target.id)?;

    if json {
        print_json(&serde_json::json!({
            "id": target.id,
            "deleted": deleted,
        }))?;
    } else {
        println!("Deleted watchlist '{}'.", target.name);
    }
    Ok(())
}

pub fn add(root: &Path, reference: &str, ticker: &str, json: bool) -> anyhow::Result<()> {
    let mut service = open(root)?;
    let target = resolve(&service, reference)?;
    let added = service
        .add_to_watchlist(&target.id, ticker)
        .with_context(|| format!("failed to add '{ticker}' to '{}'", target.name))?;

    if json {
        print_json(&serde_json::json!({
            "id": target.id,
            "ticker": ticker,
            "added": added,
        }))?;
    } else if added {
        println!("Added '{ticker}' to '{}'.", target.name);
    } else {
        println!("'{ticker}' is already in '{}'.", target.name);
    }
    Ok(())
}

pub fn remove(root: &Path, reference: &str, ticker: &str, json: bool) -> anyhow::Result<()> {
    let mut service = open(root)?;
    let target = resolve(&service, reference)?;
    let removed = service.remove_from_watchlist(&target.id, ticker)?;

    if json {
        print_json(&serde_json::json!({
            "id": target.id,
            "ticker": ticker,
            "removed": removed,
        }))?;
    } else if removed {
        println!("Removed '{ticker}' from '{}'.", target.name);
    } else {
        println!("'{ticker}' is not in '{}'.", target.name);
    }
    Ok(())
}

pub fn toggle(root: &Path, reference: &str, ticker: &str, json: bool) -> anyhow::Result<()> {
    let mut service = open(root)?;
    let target = resolve(&service, reference)?;
    let watched = service
        .toggle_in_watchlist(&target.id, ticker)
        .with_context(|| format!("failed to toggle '{ticker}' in '{}'", target.name))?
        .ok_or_else(|| WatchlistError::WatchlistNotFound(target.id.clone()))?;

    if json {
        print_json(&serde_json::json!({
            "id": target.id,
            "ticker": ticker,
            "watched": watched,
        }))?;
    } else if watched {
        println!("Added '{ticker}' to '{}'.", target.name);
    } else {
        println!("Removed '{ticker}' from '{}'.", target.name);
    }
    Ok(())
}

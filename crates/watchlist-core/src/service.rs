//! The watchlist service: sole owner and mutator of the canonical collection.
//!
//! Every mutation builds a new snapshot, swaps it in, persists it through the
//! store (best effort) and then notifies subscribers in registration order.
//! Mutations that would change nothing are skipped entirely: no timestamp
//! refresh, no write, no notification.

use crate::error::{Result, WatchlistError};
use crate::store::WatchlistStore;
use crate::watchlist::{self, Watchlist};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

/// Immutable view of the whole collection at one point in time.
pub type Snapshot = Rc<[Watchlist]>;

type Callback = Rc<dyn Fn(&Snapshot)>;

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

/// Handle returned by [`WatchlistService::subscribe`]. Dropping it (or
/// calling [`Subscription::unsubscribe`]) removes the callback.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<RefCell<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Keep the callback registered for the rest of the service's life.
    pub fn detach(mut self) {
        self.subscribers = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        // The callback may own other handles; release the borrow before it
        // is dropped.
        let removed = {
            let mut subscribers = subscribers.borrow_mut();
            let pos = subscribers.entries.iter().position(|(id, _)| *id == self.id);
            pos.map(|pos| subscribers.entries.remove(pos))
        };
        drop(removed);
    }
}

// ---------------------------------------------------------------------------
// WatchlistService
// ---------------------------------------------------------------------------

pub struct WatchlistService {
    store: WatchlistStore,
    state: Option<Snapshot>,
    subscribers: Rc<RefCell<Subscribers>>,
}

impl WatchlistService {
    /// Create an uninitialized service. Call [`init`](Self::init) before
    /// issuing any mutation.
    pub fn new(store: WatchlistStore) -> Self {
        Self {
            store,
            state: None,
            subscribers: Rc::new(RefCell::new(Subscribers::default())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Load the collection from the store, seeding the default watchlist when
    /// nothing usable is stored. Subscribers receive the initial snapshot;
    /// that notification is the "ready" signal. Calling `init` again returns
    /// the current snapshot without reloading.
    pub fn init(&mut self) -> Snapshot {
        if let Some(snapshot) = &self.state {
            return snapshot.clone();
        }

        let (mut watchlists, mut persist) = match self.store.load_detailed() {
            Ok(loaded) => {
                let persist = loaded.needs_save();
                (loaded.watchlists, persist)
            }
            // Only content that is unreadable for good is overwritten here. A
            // record from a newer version or a failed read stays in the slot
            // until the first mutation.
            Err(e @ WatchlistError::CorruptState(_)) => {
                warn!(key = %self.store.key(), error = %e, "discarding corrupt watchlist state");
                (vec![self.store.seed_default()], true)
            }
            Err(e) => {
                warn!(key = %self.store.key(), error = %e, "cannot use stored watchlists; starting from default");
                (vec![self.store.seed_default()], false)
            }
        };

        if watchlists.is_empty() {
            info!(key = %self.store.key(), "stored collection is empty; seeding default");
            watchlists.push(self.store.seed_default());
            persist = true;
        }

        let snapshot: Snapshot = watchlists.into();
        if persist {
            self.store.save(&snapshot);
        }
        info!(count = snapshot.len(), "watchlists initialized");

        self.state = Some(snapshot.clone());
        self.notify(&snapshot);
        snapshot
    }

    /// End the session: every subscriber is dropped.
    pub fn dispose(self) {
        let removed = std::mem::take(&mut self.subscribers.borrow_mut().entries);
        debug!(subscribers = removed.len(), "disposing watchlist service");
        drop(removed);
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Register `callback` to receive every new snapshot, synchronously and
    /// after persistence, in registration order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot) + 'static,
    {
        let mut subscribers = self.subscribers.borrow_mut();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Rc::new(callback)));
        Subscription {
            id,
            subscribers: Rc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().entries.len()
    }

    fn notify(&self, snapshot: &Snapshot) {
        // Callbacks may (un)subscribe while we iterate; work from a copy.
        let callbacks: Vec<Callback> = self
            .subscribers
            .borrow()
            .entries
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The current snapshot, or `None` before `init`.
    pub fn watchlists(&self) -> Option<Snapshot> {
        self.state.clone()
    }

    pub fn get_watchlist(&self, id: &str) -> Option<Watchlist> {
        self.lists().iter().find(|w| w.id == id).cloned()
    }

    /// Membership of `ticker` in the watchlist `id`, or in any watchlist when
    /// `id` is `None`.
    pub fn is_in_watchlist(&self, ticker: &str, id: Option<&str>) -> bool {
        match id {
            Some(id) => self
                .lists()
                .iter()
                .find(|w| w.id == id)
                .is_some_and(|w| w.contains(ticker)),
            None => self.lists().iter().any(|w| w.contains(ticker)),
        }
    }

    /// Every watchlist containing `ticker`, in collection order.
    pub fn get_watchlists_for_ticker(&self, ticker: &str) -> Vec<Watchlist> {
        self.lists()
            .iter()
            .filter(|w| w.contains(ticker))
            .cloned()
            .collect()
    }

    fn lists(&self) -> &[Watchlist] {
        self.state.as_deref().unwrap_or(&[])
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Append a new, empty watchlist and return it.
    pub fn create_watchlist(&mut self, name: &str, description: Option<&str>) -> Result<Watchlist> {
        let current = self.current()?;
        let created = Watchlist::new(watchlist::generate_id(current), name, description)?;

        let mut next = current.to_vec();
        next.push(created.clone());
        self.commit(next);

        debug!(id = %created.id, name = %created.name, "created watchlist");
        Ok(created)
    }

    /// Create a watchlist already holding `ticker`, as one mutation.
    pub fn create_watchlist_with(
        &mut self,
        name: &str,
        description: Option<&str>,
        ticker: &str,
    ) -> Result<Watchlist> {
        let current = self.current()?;
        watchlist::validate_ticker(ticker)?;
        let mut created = Watchlist::new(watchlist::generate_id(current), name, description)?;
        created.add_ticker(ticker)?;

        let mut next = current.to_vec();
        next.push(created.clone());
        self.commit(next);

        debug!(id = %created.id, name = %created.name, ticker, "created watchlist");
        Ok(created)
    }

    /// Remove a watchlist. Returns `false` if no watchlist has that id.
    /// Choosing a replacement selection is left to the caller.
    pub fn delete_watchlist(&mut self, id: &str) -> Result<bool> {
        let current = self.current()?;
        if !current.iter().any(|w| w.id == id) {
            return Ok(false);
        }

        let next: Vec<Watchlist> = current.iter().filter(|w| w.id != id).cloned().collect();
        self.commit(next);

        debug!(id, "deleted watchlist");
        Ok(true)
    }

    /// Rename a watchlist. The name is validated before the id is looked up,
    /// so a blank name is rejected even for an unknown id.
    pub fn rename_watchlist(
        &mut self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<bool> {
        self.current()?;
        watchlist::normalize_name(name)?;
        let changed = self.modify(id, |w| w.rename(name, description).map(|()| true))?;
        if changed {
            debug!(id, name = name.trim(), "renamed watchlist");
        }
        Ok(changed)
    }

    /// Append `ticker` unless already present. Returns whether it was added.
    pub fn add_to_watchlist(&mut self, id: &str, ticker: &str) -> Result<bool> {
        self.current()?;
        watchlist::validate_ticker(ticker)?;
        let added = self.modify(id, |w| w.add_ticker(ticker))?;
        if added {
            debug!(id, ticker, "added ticker");
        }
        Ok(added)
    }

    /// Remove `ticker` if present. Returns whether it was removed.
    pub fn remove_from_watchlist(&mut self, id: &str, ticker: &str) -> Result<bool> {
        let removed = self.modify(id, |w| Ok(w.remove_ticker(ticker)))?;
        if removed {
            debug!(id, ticker, "removed ticker");
        }
        Ok(removed)
    }

    /// Remove `ticker` when present, add it otherwise. Returns the new
    /// membership, or `None` when no watchlist has that id.
    pub fn toggle_in_watchlist(&mut self, id: &str, ticker: &str) -> Result<Option<bool>> {
        let current = self.current()?;
        let Some(target) = current.iter().find(|w| w.id == id) else {
            return Ok(None);
        };

        if target.contains(ticker) {
            self.remove_from_watchlist(id, ticker)?;
            Ok(Some(false))
        } else {
            self.add_to_watchlist(id, ticker)?;
            Ok(Some(true))
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn current(&self) -> Result<&Snapshot> {
        self.state.as_ref().ok_or(WatchlistError::Uninitialized)
    }

    /// Apply `f` to a copy of watchlist `id`; commit only if `f` reports a
    /// change. An unknown id is a no-op.
    fn modify<F>(&mut self, id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Watchlist) -> Result<bool>,
    {
        let current = self.current()?;
        let Some(pos) = current.iter().position(|w| w.id == id) else {
            return Ok(false);
        };

        let mut updated = current[pos].clone();
        if !f(&mut updated)? {
            return Ok(false);
        }

        let mut next = current.to_vec();
        next[pos] = updated;
        self.commit(next);
        Ok(true)
    }

    fn commit(&mut self, next: Vec<Watchlist>) {
        let snapshot: Snapshot = next.into();
        self.state = Some(snapshot.clone());
        self.store.save(&snapshot);
        self.notify(&snapshot);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySlot, Slot};

    const KEY: &str = "vibeapp_watchlists";

    fn service_with(slot: &MemorySlot) -> WatchlistService {
        WatchlistService::new(WatchlistStore::new(slot.clone(), KEY, "My Watchlist"))
    }

    fn ready() -> (MemorySlot, WatchlistService) {
        let slot = MemorySlot::new();
        let mut service = service_with(&slot);
        service.init();
        (slot, service)
    }

    fn tickers(service: &WatchlistService, id: &str) -> Vec<String> {
        service.get_watchlist(id).unwrap().tickers
    }

    fn recorder(service: &WatchlistService) -> (Rc<RefCell<Vec<usize>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = service.subscribe(move |snap: &Snapshot| sink.borrow_mut().push(snap.len()));
        (seen, sub)
    }

    // -- lifecycle ----------------------------------------------------------

    #[test]
    fn init_seeds_default_and_persists_it() {
        let slot = MemorySlot::new();
        let mut service = service_with(&slot);
        assert!(!service.is_initialized());

        let snapshot = service.init();
        assert!(service.is_initialized());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "My Watchlist");
        assert!(snapshot[0].tickers.is_empty());
        assert!(slot.get(KEY).is_some());
    }

    #[test]
    fn init_is_idempotent() {
        let (_, mut service) = ready();
        let first = service.init();
        let second = service.init();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn operations_before_init_are_rejected() {
        let slot = MemorySlot::new();
        let mut service = service_with(&slot);

        assert!(matches!(
            service.create_watchlist("Growth", None),
            Err(WatchlistError::Uninitialized)
        ));
        assert!(matches!(
            service.delete_watchlist("x"),
            Err(WatchlistError::Uninitialized)
        ));
        assert!(matches!(
            service.rename_watchlist("x", "y", None),
            Err(WatchlistError::Uninitialized)
        ));
        assert!(matches!(
            service.add_to_watchlist("x", "AAPL"),
            Err(WatchlistError::Uninitialized)
        ));
        assert!(matches!(
            service.remove_from_watchlist("x", "AAPL"),
            Err(WatchlistError::Uninitialized)
        ));
        assert!(matches!(
            service.toggle_in_watchlist("x", "AAPL"),
            Err(WatchlistError::Uninitialized)
        ));

        // Queries never fail.
        assert!(!service.is_in_watchlist("AAPL", None));
        assert!(service.get_watchlists_for_ticker("AAPL").is_empty());
        assert!(service.watchlists().is_none());
        // Nothing was written while uninitialized.
        assert!(slot.get(KEY).is_none());
    }

    #[test]
    fn init_recovers_from_corrupt_state() {
        let slot = MemorySlot::new();
        slot.insert(KEY, "{{{ definitely not json");
        let mut service = service_with(&slot);

        let snapshot = service.init();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].tickers.is_empty());

        // The corrupt record was replaced by the seeded default.
        let reloaded = WatchlistStore::new(slot.clone(), KEY, "x").load().unwrap();
        assert_eq!(&reloaded[..], &snapshot[..]);
    }

    #[test]
    fn init_seeds_when_stored_collection_is_empty() {
        let (slot, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();
        service.delete_watchlist(&id).unwrap();
        assert!(service.watchlists().unwrap().is_empty());

        let mut restarted = service_with(&slot);
        let snapshot = restarted.init();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "My Watchlist");
    }

    #[test]
    fn state_survives_restart() {
        let (slot, mut service) = ready();
        let w = service.create_watchlist("Growth", Some("long term")).unwrap();
        service.add_to_watchlist(&w.id, "AAPL").unwrap();
        service.add_to_watchlist(&w.id, "NVDA").unwrap();
        let before = service.watchlists().unwrap();

        let mut restarted = service_with(&slot);
        let after = restarted.init();
        assert_eq!(&after[..], &before[..]);
    }

    #[test]
    fn dispose_drops_subscribers() {
        let (_, service) = ready();
        let (_seen, sub) = recorder(&service);
        let shared = service.subscribers.clone();
        assert_eq!(service.subscriber_count(), 1);

        service.dispose();
        assert!(shared.borrow().entries.is_empty());
        // Dropping the handle after dispose is harmless.
        drop(sub);
    }

    // -- scenarios ----------------------------------------------------------

    #[test]
    fn scenario_create_then_add() {
        let (_, mut service) = ready();
        let w = service.create_watchlist("Growth", None).unwrap();
        assert!(!w.id.is_empty());
        assert!(w.tickers.is_empty());

        assert!(service.add_to_watchlist(&w.id, "AAPL").unwrap());
        assert!(service.is_in_watchlist("AAPL", Some(&w.id)));
        assert!(service.is_in_watchlist("AAPL", None));
    }

    #[test]
    fn scenario_double_add_keeps_one() {
        let (_, mut service) = ready();
        let w = service.create_watchlist("Growth", None).unwrap();
        assert!(service.add_to_watchlist(&w.id, "AAPL").unwrap());
        assert!(!service.add_to_watchlist(&w.id, "AAPL").unwrap());
        assert_eq!(tickers(&service, &w.id), vec!["AAPL"]);
    }

    #[test]
    fn scenario_remove_absent_is_noop() {
        let (_, mut service) = ready();
        let w = service.create_watchlist("Growth", None).unwrap();
        service.add_to_watchlist(&w.id, "AAPL").unwrap();
        let before = service.get_watchlist(&w.id).unwrap();

        assert!(!service.remove_from_watchlist(&w.id, "MSFT").unwrap());
        assert_eq!(service.get_watchlist(&w.id).unwrap(), before);
    }

    #[test]
    fn scenario_rename_to_blank_is_rejected() {
        let (_, mut service) = ready();
        let w = service.create_watchlist("Growth", None).unwrap();

        assert!(matches!(
            service.rename_watchlist(&w.id, "", None),
            Err(WatchlistError::InvalidName(_))
        ));
        assert!(matches!(
            service.rename_watchlist("missing", "   ", None),
            Err(WatchlistError::InvalidName(_))
        ));
        assert_eq!(service.get_watchlist(&w.id).unwrap().name, "Growth");
    }

    #[test]
    fn scenario_ticker_in_two_lists() {
        let (_, mut service) = ready();
        let a = service.create_watchlist("EV", None).unwrap();
        let b = service.create_watchlist("Momentum", None).unwrap();
        let c = service.create_watchlist("Dividends", None).unwrap();
        service.add_to_watchlist(&a.id, "TSLA").unwrap();
        service.add_to_watchlist(&c.id, "TSLA").unwrap();
        service.add_to_watchlist(&b.id, "AAPL").unwrap();

        let ids: Vec<String> = service
            .get_watchlists_for_ticker("TSLA")
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    // -- operations ---------------------------------------------------------

    #[test]
    fn create_rejects_blank_name_without_mutating() {
        let (_, mut service) = ready();
        let (seen, _sub) = recorder(&service);
        assert!(matches!(
            service.create_watchlist(" \t ", None),
            Err(WatchlistError::InvalidName(_))
        ));
        assert_eq!(service.watchlists().unwrap().len(), 1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn create_appends_with_unique_ids() {
        let (_, mut service) = ready();
        let mut ids = std::collections::HashSet::new();
        for i in 0..25 {
            let w = service.create_watchlist(&format!("List {i}"), None).unwrap();
            assert!(ids.insert(w.id));
        }
        let snapshot = service.watchlists().unwrap();
        assert_eq!(snapshot.len(), 26);
        assert_eq!(snapshot.last().unwrap().name, "List 24");
    }

    #[test]
    fn names_need_not_be_unique() {
        let (_, mut service) = ready();
        let a = service.create_watchlist("Same", None).unwrap();
        let b = service.create_watchlist("Same", None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn delete_is_idempotent_and_allows_last() {
        let (_, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();
        assert!(service.delete_watchlist(&id).unwrap());
        assert!(!service.delete_watchlist(&id).unwrap());
        assert!(service.watchlists().unwrap().is_empty());
    }

    #[test]
    fn rename_replaces_name_and_description() {
        let (_, mut service) = ready();
        let w = service.create_watchlist("Growth", Some("tech")).unwrap();

        assert!(service.rename_watchlist(&w.id, "  Value ", None).unwrap());
        let renamed = service.get_watchlist(&w.id).unwrap();
        assert_eq!(renamed.name, "Value");
        assert_eq!(renamed.description.as_deref(), Some("tech"));
        assert!(renamed.updated_at >= w.updated_at);
        assert_eq!(renamed.created_at, w.created_at);

        service
            .rename_watchlist(&w.id, "Value", Some("banks"))
            .unwrap();
        assert_eq!(
            service.get_watchlist(&w.id).unwrap().description.as_deref(),
            Some("banks")
        );
    }

    #[test]
    fn rename_unknown_id_is_noop() {
        let (_, mut service) = ready();
        let (seen, _sub) = recorder(&service);
        assert!(!service.rename_watchlist("missing", "Value", None).unwrap());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn add_to_unknown_id_is_noop() {
        let (_, mut service) = ready();
        assert!(!service.add_to_watchlist("missing", "AAPL").unwrap());
        assert!(!service.is_in_watchlist("AAPL", None));
    }

    #[test]
    fn add_rejects_malformed_ticker() {
        let (_, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();
        assert!(matches!(
            service.add_to_watchlist(&id, ""),
            Err(WatchlistError::InvalidTicker(_))
        ));
        assert!(tickers(&service, &id).is_empty());
    }

    #[test]
    fn add_appends_to_end() {
        let (_, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();
        for t in ["MSFT", "AAPL", "TSLA", "AAPL", "GOOG"] {
            service.add_to_watchlist(&id, t).unwrap();
        }
        assert_eq!(tickers(&service, &id), vec!["MSFT", "AAPL", "TSLA", "GOOG"]);
    }

    #[test]
    fn membership_is_scoped_by_id() {
        let (_, mut service) = ready();
        let a = service.create_watchlist("A", None).unwrap();
        let b = service.create_watchlist("B", None).unwrap();
        service.add_to_watchlist(&a.id, "AAPL").unwrap();

        assert!(service.is_in_watchlist("AAPL", Some(&a.id)));
        assert!(!service.is_in_watchlist("AAPL", Some(&b.id)));
        assert!(!service.is_in_watchlist("AAPL", Some("missing")));
        assert!(!service.is_in_watchlist("aapl", None));
    }

    #[test]
    fn toggle_flips_membership() {
        let (_, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();

        assert_eq!(service.toggle_in_watchlist(&id, "AAPL").unwrap(), Some(true));
        assert!(service.is_in_watchlist("AAPL", Some(&id)));
        assert_eq!(service.toggle_in_watchlist(&id, "AAPL").unwrap(), Some(false));
        assert!(!service.is_in_watchlist("AAPL", Some(&id)));
        assert_eq!(service.toggle_in_watchlist("missing", "AAPL").unwrap(), None);
    }

    #[test]
    fn create_with_ticker_is_one_mutation() {
        let (_, mut service) = ready();
        let (seen, _sub) = recorder(&service);

        let w = service
            .create_watchlist_with("Semis", None, "NVDA")
            .unwrap();
        assert_eq!(w.tickers, vec!["NVDA"]);
        assert!(service.is_in_watchlist("NVDA", Some(&w.id)));
        assert_eq!(*seen.borrow(), vec![2]);

        assert!(matches!(
            service.create_watchlist_with("Semis", None, "NV DA"),
            Err(WatchlistError::InvalidTicker(_))
        ));
        assert_eq!(service.watchlists().unwrap().len(), 2);
    }

    // -- properties ---------------------------------------------------------

    #[test]
    fn tickers_stay_unique_under_any_add_sequence() {
        let (_, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();
        let sequence = ["A", "B", "A", "C", "B", "B", "D", "A", "C"];
        for t in sequence {
            service.add_to_watchlist(&id, t).unwrap();
        }
        let list = tickers(&service, &id);
        for t in &list {
            assert_eq!(list.iter().filter(|x| *x == t).count(), 1);
        }
        assert_eq!(list, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn timestamps_are_monotonic_across_mutations() {
        let (_, mut service) = ready();
        let w = service.create_watchlist("Growth", None).unwrap();
        let mut last = w.updated_at;

        service.add_to_watchlist(&w.id, "AAPL").unwrap();
        service.rename_watchlist(&w.id, "Growth 2", None).unwrap();
        service.add_to_watchlist(&w.id, "AAPL").unwrap();
        service.remove_from_watchlist(&w.id, "AAPL").unwrap();
        service.remove_from_watchlist(&w.id, "AAPL").unwrap();

        let current = service.get_watchlist(&w.id).unwrap();
        assert!(current.updated_at >= last);
        assert!(current.updated_at >= current.created_at);
        assert_eq!(current.created_at, w.created_at);
        last = current.updated_at;
        assert!(last >= w.created_at);
    }

    #[test]
    fn mutations_only_touch_their_target() {
        let (_, mut service) = ready();
        let a = service.create_watchlist("A", None).unwrap();
        let b = service.create_watchlist("B", None).unwrap();
        service.add_to_watchlist(&a.id, "AAPL").unwrap();
        assert_eq!(service.get_watchlist(&b.id).unwrap(), b);
    }

    #[test]
    fn snapshots_are_never_mutated_in_place() {
        let (_, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();
        let before = service.watchlists().unwrap();
        service.add_to_watchlist(&id, "AAPL").unwrap();
        assert!(before[0].tickers.is_empty());
        assert_eq!(service.watchlists().unwrap()[0].tickers, vec!["AAPL"]);
    }

    // -- notifications & persistence ----------------------------------------

    #[test]
    fn subscribers_get_init_and_each_mutation_in_order() {
        let slot = MemorySlot::new();
        let mut service = service_with(&slot);
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = order.clone();
        let _a = service.subscribe(move |_| first.borrow_mut().push("first"));
        let second = order.clone();
        let _b = service.subscribe(move |_| second.borrow_mut().push("second"));

        service.init();
        let w = service.create_watchlist("Growth", None).unwrap();
        service.add_to_watchlist(&w.id, "AAPL").unwrap();

        assert_eq!(
            *order.borrow(),
            vec!["first", "second", "first", "second", "first", "second"]
        );
    }

    #[test]
    fn noop_mutations_do_not_notify_or_write() {
        let (slot, mut service) = ready();
        let id = service.watchlists().unwrap()[0].id.clone();
        service.add_to_watchlist(&id, "AAPL").unwrap();
        let written = slot.get(KEY).unwrap();
        let (seen, _sub) = recorder(&service);

        service.add_to_watchlist(&id, "AAPL").unwrap();
        service.remove_from_watchlist(&id, "MSFT").unwrap();
        service.remove_from_watchlist("missing", "AAPL").unwrap();
        service.delete_watchlist("missing").unwrap();

        assert!(seen.borrow().is_empty());
        assert_eq!(slot.get(KEY).unwrap(), written);
    }

    #[test]
    fn notification_follows_persistence() {
        let (slot, mut service) = ready();
        let probe = slot.clone();
        let persisted = Rc::new(RefCell::new(Vec::new()));
        let sink = persisted.clone();
        let _sub = service.subscribe(move |snap: &Snapshot| {
            let stored = WatchlistStore::new(probe.clone(), KEY, "x").load().unwrap();
            sink.borrow_mut().push(&stored[..] == &snap[..]);
        });

        service.create_watchlist("Growth", None).unwrap();
        assert_eq!(*persisted.borrow(), vec![true]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let (_, mut service) = ready();
        let (seen, sub) = recorder(&service);
        service.create_watchlist("One", None).unwrap();
        sub.unsubscribe();
        service.create_watchlist("Two", None).unwrap();
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(service.subscriber_count(), 0);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let (_, mut service) = ready();
        let (seen, sub) = recorder(&service);
        sub.detach();
        service.create_watchlist("One", None).unwrap();
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(service.subscriber_count(), 1);
    }

    #[test]
    fn callbacks_may_unsubscribe_during_notification() {
        let (_, mut service) = ready();
        let holder: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(RefCell::new(0));

        let h = holder.clone();
        let c = calls.clone();
        let sub = service.subscribe(move |_| {
            *c.borrow_mut() += 1;
            h.borrow_mut().take();
        });
        *holder.borrow_mut() = Some(sub);

        service.create_watchlist("One", None).unwrap();
        service.create_watchlist("Two", None).unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    struct ReadOnlySlot(MemorySlot);

    impl Slot for ReadOnlySlot {
        fn read(&self, key: &str) -> Result<Option<String>> {
            self.0.read(key)
        }

        fn write(&self, _key: &str, _value: &str) -> Result<()> {
            Err(std::io::Error::other("quota exceeded").into())
        }
    }

    #[test]
    fn failed_writes_keep_in_memory_state() {
        let mut service = WatchlistService::new(WatchlistStore::new(
            ReadOnlySlot(MemorySlot::new()),
            KEY,
            "My Watchlist",
        ));
        service.init();
        let (seen, _sub) = recorder(&service);

        let w = service.create_watchlist("Growth", None).unwrap();
        service.add_to_watchlist(&w.id, "AAPL").unwrap();

        assert!(service.is_in_watchlist("AAPL", Some(&w.id)));
        assert_eq!(*seen.borrow(), vec![2, 2]);
    }

    #[test]
    fn dispose_drops_callbacks_that_own_their_handle() {
        let (_, service) = ready();
        let holder: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let h = holder.clone();
        let sub = service.subscribe(move |_| {
            let _keep = &h;
        });
        *holder.borrow_mut() = Some(sub);
        drop(holder);

        let shared = service.subscribers.clone();
        service.dispose();
        assert!(shared.borrow().entries.is_empty());
    }

    #[test]
    fn dropping_a_handle_releases_handles_its_callback_owns() {
        let (_, mut service) = ready();
        let (seen, inner) = recorder(&service);
        let outer = service.subscribe(move |_| {
            let _keep = &inner;
        });
        assert_eq!(service.subscriber_count(), 2);

        drop(outer);
        assert_eq!(service.subscriber_count(), 0);

        service.create_watchlist("One", None).unwrap();
        assert!(seen.borrow().is_empty());
    }

    /// A slot whose reads always fail; writes land in the wrapped slot.
    struct UnreadableSlot(MemorySlot);

    impl Slot for UnreadableSlot {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Err(std::io::Error::other("device not ready").into())
        }

        fn write(&self, key: &str, value: &str) -> Result<()> {
            self.0.write(key, value)
        }
    }

    #[test]
    fn init_recovers_from_failed_read_without_overwriting() {
        let backing = MemorySlot::new();
        backing.insert(KEY, "kept");
        let mut service = WatchlistService::new(WatchlistStore::new(
            UnreadableSlot(backing.clone()),
            KEY,
            "My Watchlist",
        ));
        let (seen, _sub) = recorder(&service);

        let snapshot = service.init();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "My Watchlist");
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(backing.get(KEY).as_deref(), Some("kept"));

        service.create_watchlist("Growth", None).unwrap();
        assert_ne!(backing.get(KEY).as_deref(), Some("kept"));
    }

    #[test]
    fn init_leaves_newer_record_until_first_mutation() {
        let slot = MemorySlot::new();
        let newer = r#"{"version":2,"watchlists":[]}"#;
        slot.insert(KEY, newer);
        let mut service = service_with(&slot);
        let (seen, _sub) = recorder(&service);

        let snapshot = service.init();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].tickers.is_empty());
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(slot.get(KEY).as_deref(), Some(newer));

        let w = service.create_watchlist("Growth", None).unwrap();
        let reloaded = WatchlistStore::new(slot.clone(), KEY, "x").load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[1].id, w.id);
    }
}

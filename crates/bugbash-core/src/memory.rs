//! In-process store and realtime feed.
//!
//! [`MemoryStore`] keeps rows in a `RefCell` and, when a [`MemoryRealtime`]
//! feed is attached, emits a change signal for every write, much like the
//! hosted backend does. Failures can be injected to exercise error paths.
//! [`NullRealtime`] is the feed to use when no realtime service exists: every
//! subscription fails once, which sends the sync controller to polling.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{Bug, BugId, BugUpdate, NewBug, Session};
use crate::store::{
    ChangeKind, Realtime, RealtimeSignal, RemoteStore, RowChange, SubscriptionId,
    SubscriptionStatus,
};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    bugs: Vec<Bug>,
    sessions: BTreeMap<String, Session>,
    next_id: BugId,
    failure: Option<StoreError>,
    fetches: usize,
}

/// Shared-state in-memory implementation of [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<StoreState>,
    feed: Option<Rc<MemoryRealtime>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a change signal on `feed` for every successful write.
    #[must_use]
    pub fn with_feed(feed: Rc<MemoryRealtime>) -> Self {
        Self {
            state: RefCell::default(),
            feed: Some(feed),
        }
    }

    /// Store rows as-is, assigning ids to rows that lack one. Emits nothing.
    pub fn seed(&self, bugs: impl IntoIterator<Item = Bug>) {
        let mut state = self.state.borrow_mut();
        for mut bug in bugs {
            let id = match bug.id {
                Some(id) => id,
                None => state.next_id + 1,
            };
            state.next_id = state.next_id.max(id);
            bug.id = Some(id);
            state.bugs.push(bug);
        }
    }

    /// Swap a session's rows for `bugs`, leaving the session row alone.
    /// Emits nothing.
    pub fn replace_bugs(&self, session_id: &str, bugs: impl IntoIterator<Item = Bug>) {
        self.state
            .borrow_mut()
            .bugs
            .retain(|b| b.session_id != session_id);
        self.seed(bugs.into_iter().map(|mut bug| {
            bug.session_id = session_id.to_string();
            bug
        }));
    }

    /// Make every operation fail with `error` until cleared.
    pub fn set_failure(&self, error: Option<StoreError>) {
        self.state.borrow_mut().failure = error;
    }

    /// Number of `fetch_bugs` calls seen, failed ones included.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.borrow().fetches
    }

    /// Copy of a stored row.
    #[must_use]
    pub fn get(&self, id: BugId) -> Option<Bug> {
        self.state
            .borrow()
            .bugs
            .iter()
            .find(|b| b.id == Some(id))
            .cloned()
    }

    #[must_use]
    pub fn has_session(&self, session_id: &str) -> bool {
        self.state.borrow().sessions.contains_key(session_id)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.state.borrow().failure.clone().map_or(Ok(()), Err)
    }

    fn emit(&self, session_id: &str, change: RowChange) {
        if let Some(feed) = &self.feed {
            feed.notify(session_id, change);
        }
    }
}

impl RemoteStore for MemoryStore {
    fn fetch_bugs(&self, session_id: &str) -> Result<Vec<Bug>, StoreError> {
        self.state.borrow_mut().fetches += 1;
        self.check()?;
        let mut bugs: Vec<Bug> = self
            .state
            .borrow()
            .bugs
            .iter()
            .filter(|b| b.session_id == session_id)
            .cloned()
            .collect();
        bugs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(bugs)
    }

    fn insert_bug(&self, bug: &NewBug, now: DateTime<Utc>) -> Result<Bug, StoreError> {
        self.check()?;
        let mut row = bug.clone().into_bug(now);
        {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            row.id = Some(state.next_id);
            state.bugs.push(row.clone());
        }
        self.emit(
            &row.session_id,
            RowChange {
                kind: ChangeKind::Insert,
                old: None,
                new: Some(row.clone()),
            },
        );
        Ok(row)
    }

    fn update_bug(&self, id: BugId, update: &BugUpdate) -> Result<(), StoreError> {
        self.check()?;
        let (old, new) = {
            let mut state = self.state.borrow_mut();
            let row = state
                .bugs
                .iter_mut()
                .find(|b| b.id == Some(id))
                .ok_or(StoreError::NotFound(id))?;
            let old = row.clone();
            update.apply_to(row);
            (old, row.clone())
        };
        self.emit(
            &new.session_id.clone(),
            RowChange {
                kind: ChangeKind::Update,
                old: Some(old),
                new: Some(new),
            },
        );
        Ok(())
    }

    fn delete_bug(&self, id: BugId) -> Result<(), StoreError> {
        self.check()?;
        let removed = {
            let mut state = self.state.borrow_mut();
            let pos = state.bugs.iter().position(|b| b.id == Some(id));
            pos.map(|pos| state.bugs.remove(pos))
        };
        if let Some(old) = removed {
            self.emit(
                &old.session_id.clone(),
                RowChange {
                    kind: ChangeKind::Delete,
                    old: Some(old),
                    new: None,
                },
            );
        }
        Ok(())
    }

    fn upsert_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.check()?;
        self.state
            .borrow_mut()
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::active(session_id, session_id, now));
        Ok(())
    }

    fn session_exists(&self, session_id: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.has_session(session_id))
    }

    fn clear_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.check()?;
        let removed: Vec<Bug> = {
            let mut state = self.state.borrow_mut();
            state.sessions.remove(session_id);
            let (gone, kept) = std::mem::take(&mut state.bugs)
                .into_iter()
                .partition::<Vec<Bug>, _>(|b| b.session_id == session_id);
            state.bugs = kept;
            gone
        };
        for old in removed {
            self.emit(
                session_id,
                RowChange {
                    kind: ChangeKind::Delete,
                    old: Some(old),
                    new: None,
                },
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryRealtime
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Subscriber {
    session_id: String,
    queue: Vec<RealtimeSignal>,
}

#[derive(Debug, Default)]
struct FeedState {
    next_id: u64,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    opened: usize,
}

/// Scriptable realtime feed.
///
/// With `acknowledge` set, each new subscription immediately queues
/// `Subscribed`; otherwise tests push statuses by hand.
#[derive(Debug, Default)]
pub struct MemoryRealtime {
    state: RefCell<FeedState>,
    acknowledge: bool,
}

impl MemoryRealtime {
    /// A feed whose subscriptions stay pending until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed that confirms every subscription straight away.
    #[must_use]
    pub fn acknowledging() -> Self {
        Self {
            state: RefCell::default(),
            acknowledge: true,
        }
    }

    /// Queue a status for one subscription.
    pub fn push_status(&self, id: SubscriptionId, status: SubscriptionStatus) {
        if let Some(sub) = self.state.borrow_mut().subscribers.get_mut(&id) {
            sub.queue.push(RealtimeSignal::Status(status));
        }
    }

    /// Queue a status for every open subscription.
    pub fn broadcast_status(&self, status: &SubscriptionStatus) {
        for sub in self.state.borrow_mut().subscribers.values_mut() {
            sub.queue.push(RealtimeSignal::Status(status.clone()));
        }
    }

    /// Queue a row change for subscribers of `session_id`.
    pub fn notify(&self, session_id: &str, change: RowChange) {
        for sub in self
            .state
            .borrow_mut()
            .subscribers
            .values_mut()
            .filter(|s| s.session_id == session_id)
        {
            sub.queue.push(RealtimeSignal::Change(change.clone()));
        }
    }

    /// Currently open subscriptions, oldest first.
    #[must_use]
    pub fn open_subscriptions(&self) -> Vec<SubscriptionId> {
        self.state.borrow().subscribers.keys().copied().collect()
    }

    /// The most recently opened subscription still open.
    #[must_use]
    pub fn latest(&self) -> Option<SubscriptionId> {
        self.state.borrow().subscribers.keys().next_back().copied()
    }

    /// Total subscriptions ever opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }
}

impl Realtime for MemoryRealtime {
    fn subscribe(&self, session_id: &str) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.opened += 1;
        let id = SubscriptionId(state.next_id);
        let queue = if self.acknowledge {
            vec![RealtimeSignal::Status(SubscriptionStatus::Subscribed)]
        } else {
            Vec::new()
        };
        state.subscribers.insert(
            id,
            Subscriber {
                session_id: session_id.to_string(),
                queue,
            },
        );
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.state.borrow_mut().subscribers.remove(&id);
    }

    fn drain(&self, id: SubscriptionId) -> Vec<RealtimeSignal> {
        self.state
            .borrow_mut()
            .subscribers
            .get_mut(&id)
            .map(|sub| std::mem::take(&mut sub.queue))
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// NullRealtime
// ---------------------------------------------------------------------------

/// A realtime feed that is never available.
#[derive(Debug, Default)]
pub struct NullRealtime {
    next_id: RefCell<u64>,
    pending: RefCell<HashSet<SubscriptionId>>,
}

impl NullRealtime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Realtime for NullRealtime {
    fn subscribe(&self, _session_id: &str) -> SubscriptionId {
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        let id = SubscriptionId(*next);
        self.pending.borrow_mut().insert(id);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.pending.borrow_mut().remove(&id);
    }

    fn drain(&self, id: SubscriptionId) -> Vec<RealtimeSignal> {
        if self.pending.borrow_mut().remove(&id) {
            vec![RealtimeSignal::Status(SubscriptionStatus::Error(
                "realtime unavailable".to_string(),
            ))]
        } else {
            Vec::new()
        }
    }
}

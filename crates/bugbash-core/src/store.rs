//! Contracts for the remote table store and its realtime change feed.
//!
//! The store is an opaque hosted backend: the core only ever asks it for
//! the full bug list of a session and issues single-row writes. Change
//! notifications are treated as "something changed" hints; every consumer
//! re-fetches the whole snapshot rather than patching rows.

use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{Bug, BugId, BugUpdate, NewBug};

// ---------------------------------------------------------------------------
// Table store
// ---------------------------------------------------------------------------

/// Query and write access to the `bugs` and `sessions` tables.
///
/// Methods take `&self`: implementations either talk over the network or
/// keep interior state, and the sync controller and action layer share one
/// store.
pub trait RemoteStore {
    /// All bugs of a session, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or validation failure.
    fn fetch_bugs(&self, session_id: &str) -> Result<Vec<Bug>, StoreError>;

    /// Insert a report and return the stored row with its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or validation failure.
    fn insert_bug(&self, bug: &NewBug, now: DateTime<Utc>) -> Result<Bug, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id, or a transport or
    /// validation failure.
    fn update_bug(&self, id: BugId, update: &BugUpdate) -> Result<(), StoreError>;

    /// Delete one bug. Deleting a missing id succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or validation failure.
    fn delete_bug(&self, id: BugId) -> Result<(), StoreError>;

    /// Create the session row if missing; idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or validation failure.
    fn upsert_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Whether the session row exists. A cleared session has none until
    /// someone registers it again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or validation failure.
    fn session_exists(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Remove the session row, then every bug of the session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or validation failure.
    fn clear_session(&self, session_id: &str) -> Result<(), StoreError>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for Rc<T> {
    fn fetch_bugs(&self, session_id: &str) -> Result<Vec<Bug>, StoreError> {
        (**self).fetch_bugs(session_id)
    }

    fn insert_bug(&self, bug: &NewBug, now: DateTime<Utc>) -> Result<Bug, StoreError> {
        (**self).insert_bug(bug, now)
    }

    fn update_bug(&self, id: BugId, update: &BugUpdate) -> Result<(), StoreError> {
        (**self).update_bug(id, update)
    }

    fn delete_bug(&self, id: BugId) -> Result<(), StoreError> {
        (**self).delete_bug(id)
    }

    fn upsert_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).upsert_session(session_id, now)
    }

    fn session_exists(&self, session_id: &str) -> Result<bool, StoreError> {
        (**self).session_exists(session_id)
    }

    fn clear_session(&self, session_id: &str) -> Result<(), StoreError> {
        (**self).clear_session(session_id)
    }
}

impl<T: RemoteStore + ?Sized> RemoteStore for &T {
    fn fetch_bugs(&self, session_id: &str) -> Result<Vec<Bug>, StoreError> {
        (**self).fetch_bugs(session_id)
    }

    fn insert_bug(&self, bug: &NewBug, now: DateTime<Utc>) -> Result<Bug, StoreError> {
        (**self).insert_bug(bug, now)
    }

    fn update_bug(&self, id: BugId, update: &BugUpdate) -> Result<(), StoreError> {
        (**self).update_bug(id, update)
    }

    fn delete_bug(&self, id: BugId) -> Result<(), StoreError> {
        (**self).delete_bug(id)
    }

    fn upsert_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).upsert_session(session_id, now)
    }

    fn session_exists(&self, session_id: &str) -> Result<bool, StoreError> {
        (**self).session_exists(session_id)
    }

    fn clear_session(&self, session_id: &str) -> Result<(), StoreError> {
        (**self).clear_session(session_id)
    }
}

// ---------------------------------------------------------------------------
// Realtime feed
// ---------------------------------------------------------------------------

/// Handle for one realtime subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Health of a subscription as reported by the realtime service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    Error(String),
    TimedOut,
    Closed,
}

impl SubscriptionStatus {
    /// Any status other than `Subscribed` means the feed is unusable.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Subscribed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change notification. Rows are informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange {
    pub kind: ChangeKind,
    pub old: Option<Bug>,
    pub new: Option<Bug>,
}

/// Anything the realtime service can tell a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeSignal {
    Status(SubscriptionStatus),
    Change(RowChange),
}

/// A change-notification service scoped to one session at a time.
///
/// Signals are queued by the implementation and handed over on
/// [`Realtime::drain`], so the consumer decides when to react.
pub trait Realtime {
    /// Open a subscription for changes to `session_id`'s bugs.
    fn subscribe(&self, session_id: &str) -> SubscriptionId;

    /// Release a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Take all signals queued for `id` since the last drain.
    fn drain(&self, id: SubscriptionId) -> Vec<RealtimeSignal>;
}

impl<T: Realtime + ?Sized> Realtime for Rc<T> {
    fn subscribe(&self, session_id: &str) -> SubscriptionId {
        (**self).subscribe(session_id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id);
    }

    fn drain(&self, id: SubscriptionId) -> Vec<RealtimeSignal> {
        (**self).drain(id)
    }
}

impl<T: Realtime + ?Sized> Realtime for &T {
    fn subscribe(&self, session_id: &str) -> SubscriptionId {
        (**self).subscribe(session_id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id);
    }

    fn drain(&self, id: SubscriptionId) -> Vec<RealtimeSignal> {
        (**self).drain(id)
    }
}

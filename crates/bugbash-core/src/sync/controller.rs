use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::SyncSettings;
use crate::bus::NotificationBus;
use crate::diff::SnapshotDiffer;
use crate::error::StoreError;
use crate::event::DomainEvent;
use crate::model::Bug;
use crate::snapshot::Snapshot;
use crate::store::{Realtime, RealtimeSignal, RemoteStore, SubscriptionId, SubscriptionStatus};

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Uninitialized,
    /// Subscription requested, not yet confirmed.
    Subscribing,
    /// Realtime feed healthy; no polling.
    Live,
    /// Feed unhealthy; polling on a fixed interval and retrying the feed.
    Polling,
    Closed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Subscribing => "subscribing",
            Self::Live => "live",
            Self::Polling => "polling",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Proof that a fetch was started, used to discard late results.
///
/// A result is applied only if its ticket belongs to the current epoch and is
/// newer than the last applied fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    epoch: u64,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type EventListener = Box<dyn FnMut(&DomainEvent)>;

/// What a surface renders.
#[derive(Debug, Clone, Copy)]
pub struct SyncView<'a> {
    pub session_id: &'a str,
    pub bugs: &'a [Bug],
    pub error: Option<&'a StoreError>,
    pub state: SyncState,
}

/// Keeps one session's snapshot current and derives events from it.
pub struct SyncController<S, R> {
    store: S,
    realtime: R,
    settings: SyncSettings,
    session_id: String,
    state: SyncState,
    snapshot: Snapshot,
    differ: SnapshotDiffer,
    error: Option<StoreError>,
    session_error: Option<StoreError>,
    subscription: Option<SubscriptionId>,
    subscribed_at: u64,
    next_poll_at: Option<u64>,
    next_resubscribe_at: Option<u64>,
    epoch: u64,
    next_seq: u64,
    last_applied_seq: u64,
    listeners: Vec<(ListenerId, EventListener)>,
    next_listener: u64,
    bus: Option<NotificationBus>,
    /// Sessions other surfaces reported as cleared, handled on the next tick.
    cleared: Rc<RefCell<Vec<String>>>,
}

impl<S, R> fmt::Debug for SyncController<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncController")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("bugs", &self.snapshot.len())
            .field("error", &self.error)
            .field("subscription", &self.subscription)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl<S: RemoteStore, R: Realtime> SyncController<S, R> {
    #[must_use]
    pub fn new(store: S, realtime: R, session_id: &str, settings: SyncSettings) -> Self {
        Self {
            store,
            realtime,
            settings,
            session_id: session_id.to_string(),
            state: SyncState::Uninitialized,
            snapshot: Snapshot::default(),
            differ: SnapshotDiffer::new(settings.milestone_every),
            error: None,
            session_error: None,
            subscription: None,
            subscribed_at: 0,
            next_poll_at: None,
            next_resubscribe_at: None,
            epoch: 0,
            next_seq: 0,
            last_applied_seq: 0,
            listeners: Vec::new(),
            next_listener: 0,
            bus: None,
            cleared: Rc::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Last fetch failure, cleared by the next successful fetch.
    #[must_use]
    pub const fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    /// Why the last session registration failed, if it did. Independent of
    /// fetch errors.
    #[must_use]
    pub const fn session_error(&self) -> Option<&StoreError> {
        self.session_error.as_ref()
    }

    #[must_use]
    pub const fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    #[must_use]
    pub fn view(&self) -> SyncView<'_> {
        SyncView {
            session_id: &self.session_id,
            bugs: self.snapshot.bugs(),
            error: self.error.as_ref(),
            state: self.state,
        }
    }

    // -----------------------------------------------------------------------
    // Event listeners
    // -----------------------------------------------------------------------

    /// Register a callback for every derived event.
    pub fn subscribe_events(&mut self, listener: impl FnMut(&DomainEvent) + 'static) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn unsubscribe_events(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Publish derived events on `bus` and react to sessions cleared by
    /// other surfaces on the same bus.
    pub fn attach_bus(&mut self, bus: NotificationBus) {
        let cleared = Rc::clone(&self.cleared);
        bus.on_session_reset(move |session| cleared.borrow_mut().push(session.to_string()));
        self.bus = Some(bus);
    }

    fn emit(&mut self, events: &[DomainEvent]) {
        for event in events {
            debug!(kind = %event.kind(), "event");
            for (_, listener) in &mut self.listeners {
                listener(event);
            }
            if let Some(bus) = &self.bus {
                bus.publish(event);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Register the session, load the initial snapshot and open the feed.
    ///
    /// Calling `start` on a running controller does nothing.
    pub fn start(&mut self, now: u64) {
        if !matches!(self.state, SyncState::Uninitialized | SyncState::Closed) {
            return;
        }
        info!(session = %self.session_id, "starting sync");

        self.register_session();
        self.state = SyncState::Subscribing;
        self.refresh();
        self.open_subscription(now);
    }

    /// Release the feed, stop polling and invalidate in-flight fetches.
    pub fn teardown(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.realtime.unsubscribe(id);
        }
        self.next_poll_at = None;
        self.next_resubscribe_at = None;
        self.epoch += 1;
        if self.state != SyncState::Closed {
            info!(session = %self.session_id, "sync closed");
        }
        self.state = SyncState::Closed;
    }

    /// Tear down and start again on another session with a clean slate.
    pub fn switch_session(&mut self, session_id: &str, now: u64) {
        self.teardown();
        self.session_id = session_id.to_string();
        self.snapshot = Snapshot::default();
        self.differ = SnapshotDiffer::new(self.settings.milestone_every);
        self.error = None;
        self.session_error = None;
        self.state = SyncState::Uninitialized;
        self.start(now);
    }

    /// React to the session being cleared: forget the baseline, announce the
    /// reset and load whatever the store now holds as the new baseline.
    pub fn handle_session_reset(&mut self) -> Vec<DomainEvent> {
        let mut events = self.announce_reset();
        events.extend(self.refresh());
        events
    }

    fn announce_reset(&mut self) -> Vec<DomainEvent> {
        info!(session = %self.session_id, "session was reset");
        let event = self.differ.reset(&self.session_id);
        self.snapshot = Snapshot::default();
        // The clear removed the session row too.
        self.register_session();
        let events = vec![event];
        self.emit(&events);
        events
    }

    fn register_session(&mut self) {
        match self.store.upsert_session(&self.session_id, Utc::now()) {
            Ok(()) => self.session_error = None,
            Err(err) => {
                warn!(error = %err, session = %self.session_id, "session upsert failed");
                self.session_error = Some(err);
            }
        }
    }

    /// Whether the session row is gone, which only a clear does.
    fn session_was_cleared(&self) -> bool {
        match self.store.session_exists(&self.session_id) {
            Ok(exists) => !exists,
            Err(err) => {
                debug!(error = %err, "session lookup failed");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Advance the controller to `now`, returning the events it derived.
    ///
    /// Handles resets announced on the bus, drains feed signals, handles
    /// subscription health, runs due polls and resubscribe attempts, and
    /// performs at most one fetch.
    pub fn tick(&mut self, now: u64) -> Vec<DomainEvent> {
        if matches!(self.state, SyncState::Uninitialized | SyncState::Closed) {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(bus) = &self.bus {
            bus.pump();
        }
        let cleared = std::mem::take(&mut *self.cleared.borrow_mut());
        if cleared.iter().any(|session| *session == self.session_id) {
            events.extend(self.handle_session_reset());
        }

        let mut fetch = false;
        if let Some(id) = self.subscription {
            for signal in self.realtime.drain(id) {
                // A failure earlier in the batch released this subscription.
                if self.subscription != Some(id) {
                    debug!(subscription = id.0, "ignoring signals of released subscription");
                    break;
                }
                match signal {
                    RealtimeSignal::Status(SubscriptionStatus::Subscribed) => {
                        fetch |= self.go_live();
                    }
                    RealtimeSignal::Status(status) => self.fall_back(now, &status),
                    RealtimeSignal::Change(change) => {
                        debug!(kind = ?change.kind, "change notification");
                        fetch = true;
                    }
                }
            }
        }

        if self.state == SyncState::Subscribing
            && now.saturating_sub(self.subscribed_at) >= self.settings.subscribe_timeout_ms
        {
            self.fall_back(now, &SubscriptionStatus::TimedOut);
        }

        if self.state == SyncState::Polling {
            if self.next_resubscribe_at.is_some_and(|at| now >= at) {
                self.resubscribe(now);
            }
            if self.next_poll_at.is_some_and(|at| now >= at) {
                self.next_poll_at = Some(now + self.settings.poll_interval_ms);
                fetch = true;
            }
        }

        if fetch {
            events.extend(self.refresh());
        }
        events
    }

    /// Fetch the full snapshot now and apply it.
    pub fn refresh(&mut self) -> Vec<DomainEvent> {
        let ticket = self.begin_fetch();
        let result = self.store.fetch_bugs(&self.session_id);
        self.complete_fetch(ticket, result)
    }

    /// Start a fetch whose result will be handed to [`Self::complete_fetch`].
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.next_seq += 1;
        FetchTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        }
    }

    /// Apply a fetch result unless it has been superseded.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Bug>, StoreError>,
    ) -> Vec<DomainEvent> {
        if ticket.epoch != self.epoch || ticket.seq <= self.last_applied_seq {
            debug!(seq = ticket.seq, "discarding stale fetch result");
            return Vec::new();
        }
        match result {
            Ok(bugs) => {
                self.last_applied_seq = ticket.seq;
                if bugs.is_empty() && !self.snapshot.is_empty() && self.session_was_cleared() {
                    let mut events = self.announce_reset();
                    events.extend(self.apply_snapshot(bugs));
                    return events;
                }
                self.apply_snapshot(bugs)
            }
            Err(err) => {
                warn!(error = %err, session = %self.session_id, "fetch failed");
                self.error = Some(err);
                Vec::new()
            }
        }
    }

    /// The single path by which fetched data reaches the view.
    fn apply_snapshot(&mut self, bugs: Vec<Bug>) -> Vec<DomainEvent> {
        let snapshot = Snapshot::new(bugs);
        self.error = None;
        let events = self.differ.apply(&snapshot);
        self.snapshot = snapshot;
        self.emit(&events);
        events
    }

    // -----------------------------------------------------------------------
    // Subscription handling
    // -----------------------------------------------------------------------

    fn open_subscription(&mut self, now: u64) {
        let id = self.realtime.subscribe(&self.session_id);
        debug!(subscription = id.0, "subscription requested");
        self.subscription = Some(id);
        self.subscribed_at = now;
    }

    /// Returns whether a catch-up fetch is needed.
    fn go_live(&mut self) -> bool {
        if self.state == SyncState::Live {
            return false;
        }
        let was_polling = self.state == SyncState::Polling;
        info!(session = %self.session_id, "realtime connected");
        self.state = SyncState::Live;
        self.next_poll_at = None;
        self.next_resubscribe_at = None;
        was_polling
    }

    fn fall_back(&mut self, now: u64, status: &SubscriptionStatus) {
        if let Some(id) = self.subscription.take() {
            self.realtime.unsubscribe(id);
        }
        if self.state == SyncState::Polling {
            debug!(?status, "resubscribe attempt failed");
            return;
        }
        warn!(?status, session = %self.session_id, "realtime unavailable, polling");
        self.state = SyncState::Polling;
        self.next_poll_at = Some(now);
        self.next_resubscribe_at = Some(now + self.settings.resubscribe_interval_ms);
    }

    fn resubscribe(&mut self, now: u64) {
        if let Some(id) = self.subscription.take() {
            self.realtime.unsubscribe(id);
        }
        self.next_resubscribe_at = Some(now + self.settings.resubscribe_interval_ms);
        self.open_subscription(now);
    }
}

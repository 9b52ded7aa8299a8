//! Best-effort fan-out of domain events between surfaces on one host.
//!
//! The bus rides on a [`BroadcastChannel`] primitive: a named channel where a
//! post reaches every *other* endpoint. When no primitive is available the
//! bus is inert and every call is a silent no-op. Delivery is never
//! guaranteed and nothing is retried.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::DomainEvent;

/// Channel name shared by every surface of a tracker.
pub const CHANNEL_NAME: &str = "bug_hunt_live_updates";

/// Callback for raw messages arriving on a channel.
pub type MessageHandler = Box<dyn FnMut(&str)>;

/// A same-host broadcast primitive.
pub trait BroadcastChannel {
    /// Send a message to every other endpoint on the channel.
    fn post(&self, message: &str);

    /// Install (or with `None`, remove) the single message handler.
    fn set_handler(&self, handler: Option<MessageHandler>);

    /// Deliver queued inbound messages to the handler; returns how many were
    /// taken off the queue.
    fn pump(&self) -> usize;
}

// ---------------------------------------------------------------------------
// NotificationBus
// ---------------------------------------------------------------------------

/// Control messages that travel next to events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SessionUpdate {
    /// Every bug of the session was deleted by a moderator.
    SessionCleared { session_id: String },
}

enum Inbound {
    Event(DomainEvent),
    Update(SessionUpdate),
}

fn decode(raw: &str) -> Result<Inbound, serde_json::Error> {
    if let Ok(update) = serde_json::from_str::<SessionUpdate>(raw) {
        return Ok(Inbound::Update(update));
    }
    serde_json::from_str::<DomainEvent>(raw).map(Inbound::Event)
}

type EventHandler = Box<dyn FnMut(DomainEvent)>;
type ResetHandler = Box<dyn FnMut(&str)>;

#[derive(Default)]
struct Handlers {
    events: Option<EventHandler>,
    resets: Option<ResetHandler>,
    /// Bumped on every (un)registration so a handler replaced while it runs
    /// is not put back afterwards.
    generation: u64,
}

impl Handlers {
    fn bump(&mut self) {
        self.generation += 1;
    }
}

fn dispatch(handlers: &RefCell<Handlers>, raw: &str) {
    let message = match decode(raw) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "dropping malformed bus message");
            return;
        }
    };
    let generation = handlers.borrow().generation;
    match message {
        Inbound::Event(event) => {
            let taken = handlers.borrow_mut().events.take();
            if let Some(mut handler) = taken {
                handler(event);
                let mut slots = handlers.borrow_mut();
                if slots.generation == generation {
                    slots.events = Some(handler);
                }
            }
        }
        Inbound::Update(SessionUpdate::SessionCleared { session_id }) => {
            debug!(session = %session_id, "session cleared on another surface");
            let taken = handlers.borrow_mut().resets.take();
            if let Some(mut handler) = taken {
                handler(&session_id);
                let mut slots = handlers.borrow_mut();
                if slots.generation == generation {
                    slots.resets = Some(handler);
                }
            }
        }
    }
}

/// Typed [`DomainEvent`] publishing over an optional broadcast primitive.
///
/// Besides events the bus carries session updates: [`Self::announce_reset`]
/// tells other surfaces that a session was cleared.
pub struct NotificationBus {
    channel: Option<Rc<dyn BroadcastChannel>>,
    handlers: Rc<RefCell<Handlers>>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::disabled()
    }
}

impl NotificationBus {
    #[must_use]
    pub fn new(channel: Option<Rc<dyn BroadcastChannel>>) -> Self {
        let handlers: Rc<RefCell<Handlers>> = Rc::default();
        match &channel {
            Some(channel) => {
                let slots = Rc::clone(&handlers);
                channel.set_handler(Some(Box::new(move |raw: &str| dispatch(&slots, raw))));
            }
            None => debug!("no broadcast primitive, notification bus disabled"),
        }
        Self { channel, handlers }
    }

    /// A bus with no primitive.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            channel: None,
            handlers: Rc::default(),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    fn post<T: Serialize>(&self, message: &T, what: &str) {
        let Some(channel) = &self.channel else {
            return;
        };
        match serde_json::to_string(message) {
            Ok(raw) => channel.post(&raw),
            Err(err) => warn!(error = %err, what, "failed to encode bus message"),
        }
    }

    /// Send `event` to other surfaces.
    pub fn publish(&self, event: &DomainEvent) {
        self.post(event, event.kind().as_str());
    }

    /// Tell other surfaces that `session_id` was cleared.
    pub fn announce_reset(&self, session_id: &str) {
        self.post(
            &SessionUpdate::SessionCleared {
                session_id: session_id.to_string(),
            },
            "session_cleared",
        );
    }

    /// Receive events from other surfaces. Replaces any earlier handler.
    pub fn subscribe(&self, handler: impl FnMut(DomainEvent) + 'static) {
        let mut slots = self.handlers.borrow_mut();
        slots.events = Some(Box::new(handler));
        slots.bump();
    }

    /// Receive the id of every session another surface cleared. Replaces any
    /// earlier handler.
    pub fn on_session_reset(&self, handler: impl FnMut(&str) + 'static) {
        let mut slots = self.handlers.borrow_mut();
        slots.resets = Some(Box::new(handler));
        slots.bump();
    }

    /// Stop receiving events and session updates.
    pub fn unsubscribe(&self) {
        let mut slots = self.handlers.borrow_mut();
        slots.events = None;
        slots.resets = None;
        slots.bump();
    }

    /// Deliver pending inbound messages.
    pub fn pump(&self) -> usize {
        self.channel.as_ref().map_or(0, |channel| channel.pump())
    }
}

// ---------------------------------------------------------------------------
// LocalBroadcast
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HubState {
    next_id: u64,
    inboxes: BTreeMap<u64, Inbox>,
}

impl HubState {
    /// Drop inboxes whose endpoint went away while the hub was borrowed.
    fn prune(&mut self) {
        self.inboxes.retain(|_, inbox| inbox.is_open());
    }
}

#[derive(Debug)]
struct Inbox {
    channel: String,
    queue: VecDeque<String>,
    owner: Weak<()>,
}

impl Inbox {
    fn is_open(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// In-process broadcast hub. Cloning shares the hub.
#[derive(Debug, Clone, Default)]
pub struct LocalBroadcast {
    state: Rc<RefCell<HubState>>,
}

impl LocalBroadcast {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new endpoint on `channel`.
    #[must_use]
    pub fn open(&self, channel: &str) -> Rc<LocalEndpoint> {
        let mut state = self.state.borrow_mut();
        state.prune();
        state.next_id += 1;
        let id = state.next_id;
        let alive = Rc::new(());
        state.inboxes.insert(
            id,
            Inbox {
                channel: channel.to_string(),
                queue: VecDeque::new(),
                owner: Rc::downgrade(&alive),
            },
        );
        Rc::new(LocalEndpoint {
            id,
            channel: channel.to_string(),
            hub: Rc::clone(&self.state),
            handler: RefCell::new(None),
            generation: Cell::new(0),
            _alive: alive,
        })
    }

    /// Endpoints currently open on `channel`.
    #[must_use]
    pub fn endpoint_count(&self, channel: &str) -> usize {
        self.state
            .borrow()
            .inboxes
            .values()
            .filter(|inbox| inbox.channel == channel && inbox.is_open())
            .count()
    }
}

/// One surface's handle on a [`LocalBroadcast`] channel.
pub struct LocalEndpoint {
    id: u64,
    channel: String,
    hub: Rc<RefCell<HubState>>,
    handler: RefCell<Option<MessageHandler>>,
    /// Bumped by `set_handler`, so a handler swapped mid-pump is not undone.
    generation: Cell<u64>,
    /// The hub holds a `Weak` to this; a dead one marks the inbox for pruning.
    _alive: Rc<()>,
}

impl std::fmt::Debug for LocalEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEndpoint")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl BroadcastChannel for LocalEndpoint {
    fn post(&self, message: &str) {
        let mut hub = self.hub.borrow_mut();
        hub.prune();
        for (id, inbox) in &mut hub.inboxes {
            if *id != self.id && inbox.channel == self.channel {
                inbox.queue.push_back(message.to_string());
            }
        }
    }

    fn set_handler(&self, handler: Option<MessageHandler>) {
        self.generation.set(self.generation.get() + 1);
        *self.handler.borrow_mut() = handler;
    }

    fn pump(&self) -> usize {
        let messages: Vec<String> = self
            .hub
            .borrow_mut()
            .inboxes
            .get_mut(&self.id)
            .map(|inbox| inbox.queue.drain(..).collect())
            .unwrap_or_default();
        if messages.is_empty() {
            return 0;
        }

        let generation = self.generation.get();
        let mut handler = self.handler.borrow_mut().take();
        if let Some(handler) = handler.as_mut() {
            for message in &messages {
                handler(message);
            }
        }
        if self.generation.get() == generation {
            *self.handler.borrow_mut() = handler;
        }
        messages.len()
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        // If the hub is busy the inbox stays until the next prune.
        if let Ok(mut hub) = self.hub.try_borrow_mut() {
            hub.inboxes.remove(&self.id);
        }
    }
}

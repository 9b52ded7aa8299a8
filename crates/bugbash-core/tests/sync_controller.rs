//! Controller behaviour against the in-memory store and a scripted feed.
//!
//! Time is a plain millisecond counter; nothing here sleeps.

use std::cell::RefCell;
use std::rc::Rc;

use bugbash_core::actions::BugActions;
use bugbash_core::auth::{Actor, OpenPolicy};
use bugbash_core::bus::{BroadcastChannel, CHANNEL_NAME, LocalBroadcast, NotificationBus};
use bugbash_core::event::{DomainEvent, EventKind};
use bugbash_core::memory::{MemoryRealtime, MemoryStore};
use bugbash_core::model::{Severity, Status};
use bugbash_core::store::{RemoteStore, SubscriptionStatus};
use bugbash_core::sync::{SyncController, SyncSettings, SyncState};
use bugbash_core::StoreError;
use chrono::Utc;

#[path = "generators.rs"]
mod generators;
use generators::make_bug;

type Controller = SyncController<Rc<MemoryStore>, Rc<MemoryRealtime>>;

struct Harness {
    store: Rc<MemoryStore>,
    feed: Rc<MemoryRealtime>,
    ctl: Controller,
    seen: Rc<RefCell<Vec<DomainEvent>>>,
}

impl Harness {
    fn new(feed: MemoryRealtime) -> Self {
        let feed = Rc::new(feed);
        let store = Rc::new(MemoryStore::with_feed(Rc::clone(&feed)));
        let mut ctl = SyncController::new(
            Rc::clone(&store),
            Rc::clone(&feed),
            "s",
            SyncSettings::default(),
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        ctl.subscribe_events(move |event| sink.borrow_mut().push(event.clone()));
        Self {
            store,
            feed,
            ctl,
            seen,
        }
    }

    fn actions(&self) -> BugActions<Rc<MemoryStore>, OpenPolicy> {
        BugActions::new(Rc::clone(&self.store), OpenPolicy, "s")
    }

    fn report(&self, title: &str, severity: Severity) {
        self.actions()
            .report(&Actor::named("Ann"), title, "details", severity, Utc::now())
            .expect("report");
    }

    fn seen_kinds(&self) -> Vec<EventKind> {
        self.seen.borrow().iter().map(DomainEvent::kind).collect()
    }
}

fn kinds(events: &[DomainEvent]) -> Vec<EventKind> {
    events.iter().map(DomainEvent::kind).collect()
}

/// A controller that is not live must be polling, or it would never hear
/// about another write.
fn assert_still_syncing(ctl: &Controller) {
    assert!(
        ctl.subscription().is_some() || ctl.state() == SyncState::Polling,
        "stuck in {} with no subscription",
        ctl.state()
    );
}

fn bus_on(hub: &LocalBroadcast) -> NotificationBus {
    let endpoint: Rc<dyn BroadcastChannel> = hub.open(CHANNEL_NAME);
    NotificationBus::new(Some(endpoint))
}

#[test]
fn live_feed_turns_changes_into_events() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.ctl.start(0);
    assert!(h.ctl.tick(1).is_empty());
    assert_eq!(h.ctl.state(), SyncState::Live);

    h.report("Crash on save", Severity::High);
    let events = h.ctl.tick(2);
    assert_eq!(kinds(&events), vec![EventKind::NewBugReported]);
    assert_eq!(h.seen_kinds(), vec![EventKind::NewBugReported]);
    assert_eq!(h.ctl.view().bugs.len(), 1);
}

#[test]
fn initial_load_is_a_silent_baseline() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.report("already here", Severity::Low);
    h.ctl.start(0);
    h.ctl.tick(1);
    assert_eq!(h.ctl.view().bugs.len(), 1);
    assert!(h.seen.borrow().is_empty());
}

#[test]
fn several_changes_coalesce_into_one_fetch() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.ctl.start(0);
    h.ctl.tick(1);
    let before = h.store.fetch_count();

    h.report("a", Severity::Low);
    h.report("b", Severity::Low);
    h.report("c", Severity::Low);
    let events = h.ctl.tick(2);
    assert_eq!(events.len(), 3);
    assert_eq!(h.store.fetch_count(), before + 1);
}

#[test]
fn subscription_error_switches_to_polling_with_immediate_fetch() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    assert_eq!(h.store.fetch_count(), 1);
    let sub = h.ctl.subscription().expect("subscription opened");

    h.feed
        .push_status(sub, SubscriptionStatus::Error("channel error".into()));
    h.ctl.tick(100);
    assert_eq!(h.ctl.state(), SyncState::Polling);
    assert_eq!(h.store.fetch_count(), 2);
    assert!(h.feed.open_subscriptions().is_empty());
    // Subscription trouble never shows up as a user-facing error.
    assert!(h.ctl.view().error.is_none());

    h.ctl.tick(3_099);
    assert_eq!(h.store.fetch_count(), 2);
    h.ctl.tick(3_100);
    assert_eq!(h.store.fetch_count(), 3);
}

#[test]
fn closed_and_timed_out_statuses_also_fall_back() {
    for status in [SubscriptionStatus::Closed, SubscriptionStatus::TimedOut] {
        let mut h = Harness::new(MemoryRealtime::acknowledging());
        h.ctl.start(0);
        h.ctl.tick(1);
        assert_eq!(h.ctl.state(), SyncState::Live);

        let sub = h.ctl.subscription().expect("subscription opened");
        h.feed.push_status(sub, status);
        h.ctl.tick(2);
        assert_eq!(h.ctl.state(), SyncState::Polling);
    }
}

#[test]
fn pending_subscription_times_out_into_polling() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    h.ctl.tick(9_999);
    assert_eq!(h.ctl.state(), SyncState::Subscribing);
    assert_eq!(h.store.fetch_count(), 1);

    h.ctl.tick(10_000);
    assert_eq!(h.ctl.state(), SyncState::Polling);
    assert_eq!(h.store.fetch_count(), 2);
}

#[test]
fn polling_picks_up_other_participants_writes() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    h.ctl.tick(10_000);
    assert_eq!(h.ctl.state(), SyncState::Polling);

    h.report("seen by polling", Severity::Medium);
    assert!(h.ctl.tick(11_000).is_empty());
    let events = h.ctl.tick(13_000);
    assert_eq!(kinds(&events), vec![EventKind::NewBugReported]);
}

#[test]
fn resubscribe_returns_to_live_and_stops_polling() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    let first = h.ctl.subscription().expect("subscription opened");
    h.feed.push_status(first, SubscriptionStatus::Error("down".into()));
    h.ctl.tick(0);
    assert_eq!(h.store.fetch_count(), 2);

    h.ctl.tick(30_000);
    assert_eq!(h.feed.opened(), 2);
    assert_eq!(h.store.fetch_count(), 3);
    assert_eq!(h.ctl.state(), SyncState::Polling);

    let second = h.feed.latest().expect("resubscribed");
    assert_ne!(first, second);
    h.feed.push_status(second, SubscriptionStatus::Subscribed);
    h.ctl.tick(30_001);
    assert_eq!(h.ctl.state(), SyncState::Live);
    // One catch-up fetch on reconnect, then no more polling.
    assert_eq!(h.store.fetch_count(), 4);
    h.ctl.tick(40_000);
    h.ctl.tick(70_000);
    assert_eq!(h.store.fetch_count(), 4);
    assert_eq!(h.feed.opened(), 2);
}

#[test]
fn failed_resubscribe_keeps_polling() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    h.ctl.tick(10_000);
    h.ctl.tick(40_000);
    let retry = h.feed.latest().expect("resubscribed");
    h.feed.push_status(retry, SubscriptionStatus::Error("still down".into()));
    h.ctl.tick(40_001);
    assert_eq!(h.ctl.state(), SyncState::Polling);
    assert!(h.ctl.subscription().is_none());

    h.ctl.tick(70_000);
    assert_eq!(h.feed.opened(), 3);
}

#[test]
fn signals_for_released_subscriptions_are_ignored() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    let first = h.ctl.subscription().expect("subscription opened");
    h.feed.push_status(first, SubscriptionStatus::Error("down".into()));
    h.ctl.tick(1);

    h.feed.push_status(first, SubscriptionStatus::Subscribed);
    h.ctl.tick(2);
    assert_eq!(h.ctl.state(), SyncState::Polling);
}

#[test]
fn fetch_error_is_kept_until_next_success() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.store
        .set_failure(Some(StoreError::Transport("offline".into())));
    h.ctl.start(0);
    assert!(h.ctl.view().error.is_some());
    assert_eq!(h.ctl.state(), SyncState::Subscribing);

    h.ctl.tick(1);
    assert_eq!(h.ctl.state(), SyncState::Live);
    assert!(h.ctl.view().error.is_some());

    h.store.set_failure(None);
    h.report("after outage", Severity::Low);
    let events = h.ctl.tick(2);
    assert!(h.ctl.view().error.is_none());
    assert_eq!(h.ctl.view().bugs.len(), 1);
    // The first successful fetch is the baseline.
    assert!(events.is_empty());
}

#[test]
fn persistent_poll_failure_keeps_error_and_cadence() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    h.store
        .set_failure(Some(StoreError::Transport("offline".into())));
    h.ctl.tick(10_000);
    h.ctl.tick(13_000);
    h.ctl.tick(16_000);
    assert_eq!(h.store.fetch_count(), 4);
    assert_eq!(
        h.ctl.view().error,
        Some(&StoreError::Transport("offline".into()))
    );
}

#[test]
fn teardown_discards_in_flight_fetch() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.ctl.start(0);
    let ticket = h.ctl.begin_fetch();
    h.report("late", Severity::Low);
    let rows = h.store.fetch_bugs("s").expect("fetch");

    h.ctl.teardown();
    assert!(h.ctl.complete_fetch(ticket, Ok(rows)).is_empty());
    assert!(h.ctl.view().bugs.is_empty());
    assert_eq!(h.ctl.state(), SyncState::Closed);
    assert!(h.feed.open_subscriptions().is_empty());
    assert!(h.seen.borrow().is_empty());
}

#[test]
fn switching_sessions_starts_fresh() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.report("in s", Severity::Low);
    h.store.seed([{
        let mut bug = make_bug(100, Status::New, 0, 0);
        bug.session_id = "t".into();
        bug
    }]);
    h.ctl.start(0);
    h.ctl.tick(1);
    assert_eq!(h.ctl.view().bugs[0].title, "in s");

    h.ctl.switch_session("t", 2);
    assert_eq!(h.ctl.session_id(), "t");
    assert_eq!(h.ctl.view().bugs.len(), 1);
    assert_eq!(h.ctl.view().bugs[0].id, Some(100));
    assert_eq!(h.feed.open_subscriptions().len(), 1);
    assert!(h.store.has_session("t"));
    assert!(h.seen.borrow().is_empty());
}

#[test]
fn resolving_fifth_bug_celebrates_milestone() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.store
        .seed((1..=4).map(|id| make_bug(id, Status::Resolved, 0, 0)));
    h.store.seed([make_bug(5, Status::InProgress, 0, 0)]);
    h.ctl.start(0);
    h.ctl.tick(1);

    let target = h.store.get(5).expect("seeded");
    h.actions()
        .resolve(&Actor::named("Ann"), &target, Utc::now())
        .expect("resolve");
    let events = h.ctl.tick(2);
    assert_eq!(
        kinds(&events),
        vec![EventKind::BugResolved, EventKind::MilestoneReached]
    );
    assert_eq!(
        events[1],
        DomainEvent::MilestoneReached {
            solver: "Ann".into(),
            count: 5
        }
    );
}

#[test]
fn session_reset_announces_and_rebaselines() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.report("a", Severity::Low);
    h.ctl.start(0);
    h.ctl.tick(1);

    h.actions()
        .reset_session(&Actor::named("admin"))
        .expect("reset");
    let events = h.ctl.handle_session_reset();
    assert_eq!(kinds(&events), vec![EventKind::SessionReset]);
    assert!(h.ctl.view().bugs.is_empty());

    // Deletes from the reset were already reflected; draining them is quiet.
    assert!(h.ctl.tick(2).is_empty());

    h.report("fresh start", Severity::Low);
    let events = h.ctl.tick(3);
    assert_eq!(kinds(&events), vec![EventKind::NewBugReported]);
}

#[test]
fn reopen_flows_through_as_event() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.store.seed([make_bug(1, Status::Resolved, 1, 0)]);
    h.ctl.start(0);
    h.ctl.tick(1);

    let bug = h.store.get(1).expect("seeded");
    h.actions()
        .reopen(&Actor::named("Bob"), &bug, Utc::now())
        .expect("reopen");
    let events = h.ctl.tick(2);
    assert_eq!(kinds(&events), vec![EventKind::BugReopened]);
    assert!(h.ctl.view().bugs[0].solver_name.is_none());
}

#[test]
fn writes_do_not_touch_local_state_until_synced() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.ctl.start(0);
    h.ctl.tick(1);
    h.report("pending", Severity::Low);
    assert!(h.ctl.view().bugs.is_empty());
    h.ctl.tick(2);
    assert_eq!(h.ctl.view().bugs.len(), 1);
}

// ---------------------------------------------------------------------------
// Several signals in one drain
// ---------------------------------------------------------------------------

#[test]
fn failure_then_subscribed_in_one_batch_keeps_polling() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    let first = h.ctl.subscription().expect("subscription opened");
    h.feed.push_status(first, SubscriptionStatus::Error("blip".into()));
    h.feed.push_status(first, SubscriptionStatus::Subscribed);

    h.ctl.tick(1);
    assert_eq!(h.ctl.state(), SyncState::Polling);
    assert!(h.ctl.subscription().is_none());
    assert_still_syncing(&h.ctl);

    h.report("written during the outage", Severity::High);
    let mut heard = Vec::new();
    for step in 1..=40 {
        heard.extend(h.ctl.tick(1 + step * 3_000));
        assert_still_syncing(&h.ctl);
    }
    assert_eq!(kinds(&heard), vec![EventKind::NewBugReported]);
    assert!(h.feed.opened() >= 2);
}

#[test]
fn subscribed_then_failure_in_one_batch_falls_back() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    let sub = h.ctl.subscription().expect("subscription opened");
    h.feed.push_status(sub, SubscriptionStatus::Subscribed);
    h.feed.push_status(sub, SubscriptionStatus::Closed);

    h.ctl.tick(1);
    assert_eq!(h.ctl.state(), SyncState::Polling);
    assert_still_syncing(&h.ctl);
}

#[test]
fn change_queued_behind_failure_is_still_fetched() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.start(0);
    let sub = h.ctl.subscription().expect("subscription opened");
    h.feed.push_status(sub, SubscriptionStatus::TimedOut);
    h.report("behind the failure", Severity::Low);

    let events = h.ctl.tick(1);
    assert_eq!(kinds(&events), vec![EventKind::NewBugReported]);
    assert_eq!(h.store.fetch_count(), 2);
    assert_still_syncing(&h.ctl);
}

#[test]
fn change_queued_behind_subscribed_costs_one_fetch() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.ctl.start(0);
    h.report("right after connect", Severity::Medium);

    let events = h.ctl.tick(1);
    assert_eq!(h.ctl.state(), SyncState::Live);
    assert_eq!(kinds(&events), vec![EventKind::NewBugReported]);
    assert_eq!(h.store.fetch_count(), 2);
    assert_still_syncing(&h.ctl);
}

// ---------------------------------------------------------------------------
// Session resets
// ---------------------------------------------------------------------------

#[test]
fn clear_seen_through_the_feed_is_a_reset() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.report("a", Severity::Low);
    h.report("b", Severity::Low);
    h.ctl.start(0);
    h.ctl.tick(1);

    h.actions()
        .reset_session(&Actor::named("admin"))
        .expect("reset");
    let events = h.ctl.tick(2);
    assert_eq!(kinds(&events), vec![EventKind::SessionReset]);
    assert!(h.ctl.view().bugs.is_empty());
    assert!(h.store.has_session("s"), "session registered again");

    h.report("fresh start", Severity::Low);
    assert_eq!(kinds(&h.ctl.tick(3)), vec![EventKind::NewBugReported]);
}

#[test]
fn clear_seen_by_polling_is_a_reset() {
    let mut h = Harness::new(MemoryRealtime::new());
    h.report("a", Severity::Low);
    h.ctl.start(0);
    h.ctl.tick(10_000);
    assert_eq!(h.ctl.state(), SyncState::Polling);

    h.actions()
        .reset_session(&Actor::named("admin"))
        .expect("reset");
    assert_eq!(kinds(&h.ctl.tick(13_000)), vec![EventKind::SessionReset]);
}

#[test]
fn deleting_the_last_bug_is_not_a_reset() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.report("only one", Severity::Low);
    h.ctl.start(0);
    h.ctl.tick(1);

    let id = h.ctl.view().bugs[0].id.expect("stored");
    h.actions()
        .delete(&Actor::named("admin"), id)
        .expect("delete");
    assert!(h.ctl.tick(2).is_empty());
    assert!(h.ctl.view().bugs.is_empty());
}

#[test]
fn reset_announced_on_the_bus_reaches_controller_and_board() {
    let hub = LocalBroadcast::new();
    let mut h = Harness::new(MemoryRealtime::new());
    h.ctl.attach_bus(bus_on(&hub));
    let board = bus_on(&hub);
    let on_board = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&on_board);
    board.subscribe(move |event| sink.borrow_mut().push(event));

    h.report("a", Severity::Low);
    h.ctl.start(0);

    h.actions()
        .with_bus(bus_on(&hub))
        .reset_session(&Actor::named("admin"))
        .expect("reset");
    let events = h.ctl.tick(1);
    assert_eq!(kinds(&events), vec![EventKind::SessionReset]);
    assert!(h.ctl.view().bugs.is_empty());

    board.pump();
    assert_eq!(
        *on_board.borrow(),
        vec![DomainEvent::SessionReset {
            session_id: "s".into()
        }]
    );
}

#[test]
fn reset_of_another_session_is_ignored() {
    let hub = LocalBroadcast::new();
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.ctl.attach_bus(bus_on(&hub));
    h.report("a", Severity::Low);
    h.ctl.start(0);
    h.ctl.tick(1);

    bus_on(&hub).announce_reset("other");
    assert!(h.ctl.tick(2).is_empty());
    assert_eq!(h.ctl.view().bugs.len(), 1);
}

// ---------------------------------------------------------------------------
// Session registration
// ---------------------------------------------------------------------------

#[test]
fn failed_registration_outlives_later_fetches() {
    let mut h = Harness::new(MemoryRealtime::acknowledging());
    h.store
        .set_failure(Some(StoreError::Transport("offline".into())));
    h.ctl.start(0);
    assert!(h.ctl.session_error().is_some());

    h.store.set_failure(None);
    h.ctl.refresh();
    assert!(h.ctl.view().error.is_none());
    assert_eq!(
        h.ctl.session_error(),
        Some(&StoreError::Transport("offline".into()))
    );
}

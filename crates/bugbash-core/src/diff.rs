//! Snapshot differencing and domain event derivation.
//!
//! Both realtime notifications and poll responses end in a full re-fetch, so
//! everything downstream works on whole snapshots: [`classify`] compares two
//! of them and [`derive_events`] turns the resulting [`Delta`] into
//! [`DomainEvent`]s. [`SnapshotDiffer`] remembers the previous snapshot
//! between calls.
//!
//! # First snapshot
//!
//! Without a baseline there is nothing to compare against, so the first
//! snapshot yields no events. Otherwise every pre-existing bug would be
//! announced as new on initial load.
//!
//! # Milestones
//!
//! A solver's milestone count is the number of `RESOLVED` bugs credited to
//! them in the *whole* next snapshot, not just in the delta. When a delta
//! contains several resolutions by one solver they are ordered by
//! `updated_at` (then id) and each is assigned the cumulative count it
//! reached, so crossing a multiple of the step is never missed.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::event::DomainEvent;
use crate::model::{Bug, BugId};
use crate::snapshot::Snapshot;

/// Resolutions per milestone unless configured otherwise.
pub const DEFAULT_MILESTONE_EVERY: usize = 5;

/// Solver name used when a resolved row carries none.
const UNKNOWN_SOLVER: &str = "unknown";

/// Classified changes between two snapshots, ids ascending within each list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Ids present only in the next snapshot.
    pub added: Vec<BugId>,
    /// Ids `RESOLVED` in next and not `RESOLVED` (or absent) in previous.
    pub resolved: Vec<BugId>,
    /// Ids `RESOLVED` in previous and present but not `RESOLVED` in next.
    pub reopened: Vec<BugId>,
    /// Ids present only in the previous snapshot (moderator deletes).
    pub removed: Vec<BugId>,
}

impl Delta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.resolved.is_empty()
            && self.reopened.is_empty()
            && self.removed.is_empty()
    }
}

/// Classify what changed between `previous` and `next`.
#[must_use]
pub fn classify(previous: &Snapshot, next: &Snapshot) -> Delta {
    let mut delta = Delta::default();

    for id in next.ids() {
        let Some(bug) = next.get(id) else { continue };
        match previous.get(id) {
            None => {
                delta.added.push(id);
                // Reported and resolved between two fetches.
                if bug.is_resolved() {
                    delta.resolved.push(id);
                }
            }
            Some(before) => {
                if bug.is_resolved() && !before.is_resolved() {
                    delta.resolved.push(id);
                } else if before.is_resolved() && !bug.is_resolved() {
                    delta.reopened.push(id);
                }
            }
        }
    }

    delta.removed = previous
        .ids()
        .into_iter()
        .filter(|id| !next.contains(*id))
        .collect();

    delta
}

/// Turn a classified delta into events, in the order: new reports,
/// resolutions (each followed by any milestone it reached), reopenings.
#[must_use]
pub fn derive_events(delta: &Delta, next: &Snapshot, milestone_every: usize) -> Vec<DomainEvent> {
    let mut events = Vec::new();

    for bug in delta.added.iter().filter_map(|id| next.get(*id)) {
        events.push(DomainEvent::NewBugReported {
            bug_id: id_of(bug),
            title: bug.title.clone(),
            reporter: bug.reporter_name.clone(),
            severity: bug.severity,
        });
    }

    let mut resolved: Vec<&Bug> = delta.resolved.iter().filter_map(|id| next.get(*id)).collect();
    resolved.sort_by(|a, b| {
        a.updated_at
            .cmp(&b.updated_at)
            .then_with(|| id_of(a).cmp(&id_of(b)))
    });

    let totals = resolved_totals(next);
    let mut fresh_per_solver: HashMap<&str, usize> = HashMap::new();
    for bug in &resolved {
        if let Some(solver) = bug.solver_name.as_deref() {
            *fresh_per_solver.entry(solver).or_default() += 1;
        }
    }
    let mut seen_per_solver: HashMap<&str, usize> = HashMap::new();

    for bug in resolved {
        let solver = bug.solver_name.as_deref();
        events.push(DomainEvent::BugResolved {
            bug_id: id_of(bug),
            title: bug.title.clone(),
            solver: solver.unwrap_or(UNKNOWN_SOLVER).to_string(),
            severity: bug.severity,
        });

        let Some(solver) = solver else { continue };
        let seen = seen_per_solver.entry(solver).or_default();
        *seen += 1;
        let total = totals.get(solver).copied().unwrap_or(0);
        let fresh = fresh_per_solver.get(solver).copied().unwrap_or(0);
        let reached = (total + *seen).saturating_sub(fresh);
        if milestone_every > 0 && reached > 0 && reached % milestone_every == 0 {
            events.push(DomainEvent::MilestoneReached {
                solver: solver.to_string(),
                count: reached,
            });
        }
    }

    for bug in delta.reopened.iter().filter_map(|id| next.get(*id)) {
        events.push(DomainEvent::BugReopened {
            bug_id: id_of(bug),
            title: bug.title.clone(),
        });
    }

    events
}

/// Diff two snapshots. `None` means there is no prior state.
#[must_use]
pub fn diff(previous: Option<&Snapshot>, next: &Snapshot, milestone_every: usize) -> Vec<DomainEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let delta = classify(previous, next);
    if !delta.is_empty() {
        debug!(
            added = delta.added.len(),
            resolved = delta.resolved.len(),
            reopened = delta.reopened.len(),
            removed = delta.removed.len(),
            "snapshot delta"
        );
    }
    derive_events(&delta, next, milestone_every)
}

/// Diff two plain bug lists with the default milestone step.
///
/// An empty `previous` is indistinguishable from "never loaded" here and
/// yields no events; use [`SnapshotDiffer`] when an empty baseline must count.
#[must_use]
pub fn diff_snapshots(previous: &[Bug], next: &[Bug]) -> Vec<DomainEvent> {
    if previous.is_empty() {
        return Vec::new();
    }
    let previous = Snapshot::new(previous.to_vec());
    let next = Snapshot::new(next.to_vec());
    diff(Some(&previous), &next, DEFAULT_MILESTONE_EVERY)
}

/// Per-solver count of `RESOLVED` bugs in a snapshot.
#[must_use]
pub fn resolved_totals(snapshot: &Snapshot) -> BTreeMap<&str, usize> {
    let mut totals = BTreeMap::new();
    for bug in snapshot.bugs().iter().filter(|b| b.is_resolved()) {
        if let Some(solver) = bug.solver_name.as_deref() {
            *totals.entry(solver).or_default() += 1;
        }
    }
    totals
}

fn id_of(bug: &Bug) -> BugId {
    bug.id.unwrap_or_default()
}

/// Remembers the last applied snapshot and diffs each new one against it.
#[derive(Debug, Clone)]
pub struct SnapshotDiffer {
    previous: Option<Snapshot>,
    milestone_every: usize,
}

impl Default for SnapshotDiffer {
    fn default() -> Self {
        Self::new(DEFAULT_MILESTONE_EVERY)
    }
}

impl SnapshotDiffer {
    /// `milestone_every == 0` disables milestone events.
    #[must_use]
    pub const fn new(milestone_every: usize) -> Self {
        Self {
            previous: None,
            milestone_every,
        }
    }

    /// Whether a baseline snapshot has been recorded.
    #[must_use]
    pub const fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    #[must_use]
    pub const fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    /// Diff `next` against the remembered snapshot, then remember `next`.
    pub fn apply(&mut self, next: &Snapshot) -> Vec<DomainEvent> {
        let events = diff(self.previous.as_ref(), next, self.milestone_every);
        self.previous = Some(next.clone());
        events
    }

    /// Forget the baseline after the store was cleared.
    pub fn reset(&mut self, session_id: &str) -> DomainEvent {
        self.previous = None;
        DomainEvent::SessionReset {
            session_id: session_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::model::{NewBug, Severity, Status};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    fn bug(id: BugId, status: Status, solver: Option<&str>) -> Bug {
        let mut bug = NewBug::new("s", &format!("bug {id}"), "d", Severity::Medium, "Rep")
            .unwrap()
            .into_bug(at(id));
        bug.id = Some(id);
        bug.status = status;
        bug.solver_name = solver.map(str::to_string);
        bug
    }

    fn resolved_at(id: BugId, solver: &str, secs: i64) -> Bug {
        let mut b = bug(id, Status::Resolved, Some(solver));
        b.updated_at = at(secs);
        b
    }

    fn kinds(events: &[DomainEvent]) -> Vec<EventKind> {
        events.iter().map(DomainEvent::kind).collect()
    }

    #[test]
    fn first_snapshot_yields_nothing() {
        let next = vec![bug(1, Status::New, None)];
        assert!(diff_snapshots(&[], &next).is_empty());

        let mut differ = SnapshotDiffer::default();
        assert!(differ.apply(&Snapshot::new(next)).is_empty());
        assert!(differ.has_baseline());
    }

    #[test]
    fn empty_baseline_in_differ_still_announces_first_bug() {
        let mut differ = SnapshotDiffer::default();
        assert!(differ.apply(&Snapshot::default()).is_empty());
        let events = differ.apply(&Snapshot::new(vec![bug(1, Status::New, None)]));
        assert_eq!(kinds(&events), vec![EventKind::NewBugReported]);
    }

    #[test]
    fn resolution_produces_one_event_for_solver() {
        let prev = vec![bug(1, Status::New, None)];
        let next = vec![bug(1, Status::Resolved, Some("Ann"))];
        let events = diff_snapshots(&prev, &next);
        assert_eq!(
            events,
            vec![DomainEvent::BugResolved {
                bug_id: 1,
                title: "bug 1".into(),
                solver: "Ann".into(),
                severity: Severity::Medium,
            }]
        );
    }

    #[test]
    fn fifth_resolution_adds_milestone() {
        let mut prev: Vec<Bug> = (1..=4).map(|id| bug(id, Status::Resolved, Some("Ann"))).collect();
        prev.push(bug(5, Status::InProgress, None));
        let mut next = prev.clone();
        next[4] = bug(5, Status::Resolved, Some("Ann"));

        let events = diff_snapshots(&prev, &next);
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
    fn milestone_found_when_delta_jumps_past_multiple() {
        // Ann had 3; this delta brings her to 6, crossing 5 on the second fix.
        let mut prev: Vec<Bug> = (1..=3).map(|id| bug(id, Status::Resolved, Some("Ann"))).collect();
        prev.extend((4..=6).map(|id| bug(id, Status::New, None)));
        let mut next: Vec<Bug> = prev[..3].to_vec();
        next.push(resolved_at(4, "Ann", 100));
        next.push(resolved_at(5, "Ann", 101));
        next.push(resolved_at(6, "Ann", 102));

        let events = diff_snapshots(&prev, &next);
        assert_eq!(
            kinds(&events),
            vec![
                EventKind::BugResolved,
                EventKind::BugResolved,
                EventKind::MilestoneReached,
                EventKind::BugResolved,
            ]
        );
        assert_eq!(events[1].bug_id(), Some(5));
    }

    #[test]
    fn milestones_are_per_solver() {
        let mut prev: Vec<Bug> = (1..=4).map(|id| bug(id, Status::Resolved, Some("Bob"))).collect();
        prev.push(bug(5, Status::New, None));
        let mut next = prev.clone();
        next[4] = bug(5, Status::Resolved, Some("Ann"));

        let events = diff_snapshots(&prev, &next);
        assert_eq!(kinds(&events), vec![EventKind::BugResolved]);
    }

    #[test]
    fn reopen_produces_one_event() {
        let prev = vec![bug(1, Status::Resolved, Some("Ann"))];
        let next = vec![bug(1, Status::InProgress, None)];
        let events = diff_snapshots(&prev, &next);
        assert_eq!(
            events,
            vec![DomainEvent::BugReopened {
                bug_id: 1,
                title: "bug 1".into()
            }]
        );
    }

    #[test]
    fn removal_is_classified_but_silent() {
        let prev = Snapshot::new(vec![bug(1, Status::New, None), bug(2, Status::New, None)]);
        let next = Snapshot::new(vec![bug(1, Status::New, None)]);
        let delta = classify(&prev, &next);
        assert_eq!(delta.removed, vec![2]);
        assert!(derive_events(&delta, &next, DEFAULT_MILESTONE_EVERY).is_empty());
    }

    #[test]
    fn reported_and_resolved_between_fetches_yields_both() {
        let prev = vec![bug(1, Status::New, None)];
        let next = vec![bug(1, Status::New, None), bug(2, Status::Resolved, Some("Ann"))];
        let events = diff_snapshots(&prev, &next);
        assert_eq!(
            kinds(&events),
            vec![EventKind::NewBugReported, EventKind::BugResolved]
        );
    }

    #[test]
    fn events_ordered_by_class() {
        let prev = vec![
            bug(1, Status::Resolved, Some("Ann")),
            bug(2, Status::New, None),
        ];
        let next = vec![
            bug(1, Status::InProgress, None),
            bug(2, Status::Resolved, Some("Bob")),
            bug(3, Status::New, None),
        ];
        let events = diff_snapshots(&prev, &next);
        assert_eq!(
            kinds(&events),
            vec![
                EventKind::NewBugReported,
                EventKind::BugResolved,
                EventKind::BugReopened
            ]
        );
    }

    #[test]
    fn unchanged_snapshot_is_quiet_and_idempotent() {
        let snap = Snapshot::new(vec![bug(1, Status::New, None)]);
        let mut differ = SnapshotDiffer::default();
        differ.apply(&snap);
        assert!(differ.apply(&snap).is_empty());
        assert!(differ.apply(&snap).is_empty());
    }

    #[test]
    fn reset_forgets_baseline() {
        let mut differ = SnapshotDiffer::default();
        differ.apply(&Snapshot::new(vec![bug(1, Status::New, None)]));
        let event = differ.reset("s");
        assert_eq!(
            event,
            DomainEvent::SessionReset {
                session_id: "s".into()
            }
        );
        assert!(!differ.has_baseline());
        assert!(differ
            .apply(&Snapshot::new(vec![bug(9, Status::New, None)]))
            .is_empty());
    }

    #[test]
    fn zero_step_disables_milestones() {
        let prev = Snapshot::new(vec![bug(1, Status::New, None)]);
        let next = Snapshot::new(vec![bug(1, Status::Resolved, Some("Ann"))]);
        let events = diff(Some(&prev), &next, 0);
        assert_eq!(kinds(&events), vec![EventKind::BugResolved]);
        let events = diff(Some(&prev), &next, 1);
        assert_eq!(
            kinds(&events),
            vec![EventKind::BugResolved, EventKind::MilestoneReached]
        );
    }

    #[test]
    fn missing_solver_reports_unknown_without_milestone() {
        let prev = Snapshot::new(vec![bug(1, Status::New, None)]);
        let next = Snapshot::new(vec![bug(1, Status::Resolved, None)]);
        let events = diff(Some(&prev), &next, 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], DomainEvent::BugResolved { solver, .. } if solver == "unknown"));
    }
}

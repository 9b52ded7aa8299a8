#![allow(dead_code)]

use bugbash_core::model::{Bug, BugId, NewBug, Severity, Status};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

pub const SOLVERS: [&str; 3] = ["Ann", "Bob", "Cid"];

const BASE_TS: i64 = 1_700_000_000;

pub fn ts(offset: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(BASE_TS + offset, 0)
        .single()
        .expect("valid timestamp")
}

/// A stored bug; `solver` only applies when `status` is `RESOLVED`.
pub fn make_bug(id: BugId, status: Status, solver: usize, updated: i64) -> Bug {
    let mut bug = NewBug::new("s", &format!("bug {id}"), "desc", Severity::Medium, "Rep")
        .expect("valid report")
        .into_bug(ts(id));
    bug.id = Some(id);
    bug.status = status;
    bug.solver_name =
        (status == Status::Resolved).then(|| SOLVERS[solver % SOLVERS.len()].to_string());
    bug.updated_at = ts(updated);
    bug
}

pub fn arb_status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::New),
        Just(Status::InProgress),
        Just(Status::Resolved),
    ]
}

/// A previous and next snapshot over overlapping id ranges.
pub fn arb_snapshot_pair() -> impl Strategy<Value = (Vec<Bug>, Vec<Bug>)> {
    prop::collection::vec(
        (
            any::<bool>(),
            any::<bool>(),
            arb_status(),
            arb_status(),
            0usize..3,
            0usize..3,
            0i64..1_000,
        ),
        0..40,
    )
    .prop_map(|rows| {
        let mut prev = Vec::new();
        let mut next = Vec::new();
        for (id, (in_prev, in_next, before, after, solver_before, solver_after, updated)) in
            (1..).zip(rows)
        {
            if in_prev {
                prev.push(make_bug(id, before, solver_before, 0));
            }
            if in_next {
                next.push(make_bug(id, after, solver_after, updated));
            }
        }
        (prev, next)
    })
}

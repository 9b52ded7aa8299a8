//! Domain events derived from snapshot transitions.
//!
//! These are transient notifications for surfaces (feeds, leaderboards,
//! celebrations). They are never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{BugId, Severity};

/// A meaningful state transition observed between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    NewBugReported {
        bug_id: BugId,
        title: String,
        reporter: String,
        severity: Severity,
    },
    BugResolved {
        bug_id: BugId,
        title: String,
        solver: String,
        severity: Severity,
    },
    /// A solver's resolved count reached a multiple of the milestone step.
    MilestoneReached { solver: String, count: usize },
    BugReopened { bug_id: BugId, title: String },
    SessionReset { session_id: String },
}

/// Discriminant of a [`DomainEvent`], handy for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewBugReported,
    BugResolved,
    MilestoneReached,
    BugReopened,
    SessionReset,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewBugReported => "new_bug_reported",
            Self::BugResolved => "bug_resolved",
            Self::MilestoneReached => "milestone_reached",
            Self::BugReopened => "bug_reopened",
            Self::SessionReset => "session_reset",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::NewBugReported { .. } => EventKind::NewBugReported,
            Self::BugResolved { .. } => EventKind::BugResolved,
            Self::MilestoneReached { .. } => EventKind::MilestoneReached,
            Self::BugReopened { .. } => EventKind::BugReopened,
            Self::SessionReset { .. } => EventKind::SessionReset,
        }
    }

    /// The bug this event is about, if any.
    #[must_use]
    pub const fn bug_id(&self) -> Option<BugId> {
        match self {
            Self::NewBugReported { bug_id, .. }
            | Self::BugResolved { bug_id, .. }
            | Self::BugReopened { bug_id, .. } => Some(*bug_id),
            Self::MilestoneReached { .. } | Self::SessionReset { .. } => None,
        }
    }

    /// One-line feed message.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::NewBugReported {
                title,
                reporter,
                severity,
                ..
            } => format!("New {} bug \"{title}\" reported by {reporter}", severity_word(*severity)),
            Self::BugResolved {
                title,
                solver,
                severity,
                ..
            } => {
                if *severity == Severity::Critical {
                    format!("CRITICAL bug \"{title}\" fixed by {solver}")
                } else {
                    format!("\"{title}\" fixed by {solver}")
                }
            }
            Self::MilestoneReached { solver, count } => {
                format!("{solver} reached {count} resolved bugs")
            }
            Self::BugReopened { title, .. } => format!("\"{title}\" reopened"),
            Self::SessionReset { session_id } => format!("session {session_id} was reset"),
        }
    }
}

fn severity_word(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

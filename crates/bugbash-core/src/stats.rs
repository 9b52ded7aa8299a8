//! Session statistics: headline counts, leaderboards and the boss counter.

use serde::Serialize;
use std::collections::HashMap;

use crate::model::{Bug, Severity};

/// Headline counts for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub open: usize,
    pub resolved: usize,
}

impl SessionStats {
    #[must_use]
    pub fn compute(bugs: &[Bug]) -> Self {
        let resolved = bugs.iter().filter(|b| b.is_resolved()).count();
        Self {
            total: bugs.len(),
            open: bugs.len() - resolved,
            resolved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub count: usize,
}

/// Top reporters and top solvers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leaderboards {
    pub reporters: Vec<LeaderboardEntry>,
    pub solvers: Vec<LeaderboardEntry>,
}

impl Leaderboards {
    /// Rank by count descending, ties by name, keeping at most `limit` rows.
    ///
    /// Solvers only count `RESOLVED` bugs that carry a solver name.
    #[must_use]
    pub fn compute(bugs: &[Bug], limit: usize) -> Self {
        let reporters = rank(bugs.iter().map(|b| b.reporter_name.as_str()), limit);
        let solvers = rank(
            bugs.iter()
                .filter(|b| b.is_resolved())
                .filter_map(|b| b.solver_name.as_deref()),
            limit,
        );
        Self { reporters, solvers }
    }
}

fn rank<'a>(names: impl Iterator<Item = &'a str>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut entries: Vec<LeaderboardEntry> = counts
        .into_iter()
        .map(|(name, count)| LeaderboardEntry {
            name: name.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries.truncate(limit);
    entries
}

/// Open critical/high counts and whether the "boss fight" is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BossStatus {
    pub open_critical: usize,
    pub open_high: usize,
    pub open_total: usize,
    /// Between one and `threshold` critical bugs left.
    pub boss_fight: bool,
    /// No open critical bugs, and at least one critical was ever reported.
    pub all_critical_cleared: bool,
}

impl BossStatus {
    #[must_use]
    pub fn compute(bugs: &[Bug], threshold: usize) -> Self {
        let open: Vec<&Bug> = bugs.iter().filter(|b| b.is_open()).collect();
        let open_critical = open
            .iter()
            .filter(|b| b.severity == Severity::Critical)
            .count();
        let open_high = open.iter().filter(|b| b.severity == Severity::High).count();
        let any_critical = bugs.iter().any(|b| b.severity == Severity::Critical);

        Self {
            open_critical,
            open_high,
            open_total: open.len(),
            boss_fight: open_critical > 0 && open_critical <= threshold,
            all_critical_cleared: any_critical && open_critical == 0,
        }
    }
}

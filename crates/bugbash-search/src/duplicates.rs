//! Duplicate detection over a session's open bugs.
//!
//! Every pair of open bugs is scored twice: once on titles alone and once on
//! the combined `"{title} {description}"` text. A pair whose title score
//! reaches the title threshold, or whose combined score reaches the combined
//! threshold, becomes an edge of an undirected similarity graph. Connected
//! components with at least two members are duplicate groups; the earliest
//! reported member of each is the primary.
//!
//! Clustering is transitive: if A~B and B~C then A, B and C share a group
//! even when A and C are dissimilar.
//!
//! The pairwise pass is quadratic. Sessions are expected to hold at most a
//! few hundred open bugs.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use bugbash_core::config::DuplicatesConfig;
use bugbash_core::model::{Bug, BugId};
use petgraph::graphmap::UnGraphMap;
use petgraph::visit::Bfs;
use serde::Serialize;
use tracing::{debug, warn};

use crate::similarity::{jaccard, tokenize};

/// Open-bug count above which the quadratic pass is logged as a warning.
pub const LARGE_SESSION_WARN: usize = 500;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Thresholds and filters for linking two bugs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicatePolicy {
    pub title_threshold: f64,
    pub combined_threshold: f64,
    /// Only link bugs of identical severity.
    pub require_same_severity: bool,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::from(&DuplicatesConfig::default())
    }
}

impl From<&DuplicatesConfig> for DuplicatePolicy {
    fn from(config: &DuplicatesConfig) -> Self {
        Self {
            title_threshold: config.title_threshold,
            combined_threshold: config.combined_threshold,
            require_same_severity: config.require_same_severity,
        }
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One link in the similarity graph, with the scores that created it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityEdge {
    pub a: BugId,
    pub b: BugId,
    pub title_score: f64,
    pub combined_score: f64,
}

/// A cluster of likely duplicates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    /// Earliest reported member.
    pub primary: Bug,
    /// The rest, oldest first. Never empty.
    pub duplicates: Vec<Bug>,
}

impl DuplicateGroup {
    /// Every member id, primary first.
    #[must_use]
    pub fn ids(&self) -> Vec<BugId> {
        std::iter::once(&self.primary)
            .chain(&self.duplicates)
            .filter_map(|b| b.id)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.duplicates.len()
    }

    /// Always false: a group has at least a primary and one duplicate.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Open bugs that can take part in clustering, paired with their id.
fn open_bugs(bugs: &[Bug]) -> Vec<(BugId, &Bug)> {
    let mut seen = HashSet::new();
    bugs.iter()
        .filter(|b| b.is_open())
        .filter_map(|b| b.id.map(|id| (id, b)))
        .filter(|(id, _)| seen.insert(*id))
        .collect()
}

/// Score every eligible pair of open bugs and keep those over a threshold.
///
/// Edges are returned with `a < b`, sorted by `(a, b)`.
#[must_use]
pub fn similarity_edges(bugs: &[Bug], policy: &DuplicatePolicy) -> Vec<SimilarityEdge> {
    let open = open_bugs(bugs);
    if open.len() > LARGE_SESSION_WARN {
        warn!(
            open = open.len(),
            "duplicate detection over a large session; pairwise scoring is quadratic"
        );
    }

    let tokens: Vec<(HashSet<String>, HashSet<String>)> = open
        .iter()
        .map(|(_, bug)| (tokenize(&bug.title), tokenize(&bug.combined_text())))
        .collect();

    let mut edges = Vec::new();
    for i in 0..open.len() {
        for j in (i + 1)..open.len() {
            let (id_i, bug_i) = open[i];
            let (id_j, bug_j) = open[j];
            if policy.require_same_severity && bug_i.severity != bug_j.severity {
                continue;
            }
            let title_score = jaccard(&tokens[i].0, &tokens[j].0);
            let combined_score = jaccard(&tokens[i].1, &tokens[j].1);
            if title_score >= policy.title_threshold || combined_score >= policy.combined_threshold
            {
                edges.push(SimilarityEdge {
                    a: id_i.min(id_j),
                    b: id_i.max(id_j),
                    title_score,
                    combined_score,
                });
            }
        }
    }
    edges.sort_by(|x, y| (x.a, x.b).cmp(&(y.a, y.b)));
    edges
}

fn by_age(a: &Bug, b: &Bug) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Group open bugs into clusters of likely duplicates.
///
/// Resolved bugs and bugs without an id never participate. Groups are
/// ordered by their primary's `created_at` (ties by id).
#[must_use]
pub fn compute_duplicate_groups(bugs: &[Bug], policy: &DuplicatePolicy) -> Vec<DuplicateGroup> {
    let open = open_bugs(bugs);
    if open.len() < 2 {
        return Vec::new();
    }
    let by_id: HashMap<BugId, &Bug> = open.iter().copied().collect();

    let edges = similarity_edges(bugs, policy);
    let mut graph: UnGraphMap<BugId, ()> = UnGraphMap::new();
    for edge in &edges {
        graph.add_edge(edge.a, edge.b, ());
    }

    // Deterministic traversal start order.
    let mut nodes: Vec<BugId> = graph.nodes().collect();
    nodes.sort_unstable();

    let mut visited: HashSet<BugId> = HashSet::new();
    let mut groups = Vec::new();
    for start in nodes {
        if visited.contains(&start) {
            continue;
        }
        let mut component = Vec::new();
        let mut bfs = Bfs::new(&graph, start);
        while let Some(id) = bfs.next(&graph) {
            visited.insert(id);
            component.push(id);
        }
        if component.len() < 2 {
            continue;
        }

        let mut members: Vec<&Bug> = component
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .collect();
        members.sort_by(|a, b| by_age(a, b));
        let mut members = members.into_iter().cloned();
        let Some(primary) = members.next() else {
            continue;
        };
        groups.push(DuplicateGroup {
            primary,
            duplicates: members.collect(),
        });
    }

    groups.sort_by(|a, b| by_age(&a.primary, &b.primary));
    debug!(edges = edges.len(), groups = groups.len(), "duplicate groups computed");
    groups
}

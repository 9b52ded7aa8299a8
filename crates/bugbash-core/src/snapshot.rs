use std::collections::HashMap;

use crate::model::{Bug, BugId};

/// The full set of a session's bugs as of one fetch.
///
/// Rows without an id cannot be tracked across fetches; they are kept for
/// display but never indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    bugs: Vec<Bug>,
    index: HashMap<BugId, usize>,
}

impl Snapshot {
    /// Build a snapshot, keeping the row order the store returned.
    ///
    /// If the same id appears twice the later row wins the index slot.
    #[must_use]
    pub fn new(bugs: Vec<Bug>) -> Self {
        let index = bugs
            .iter()
            .enumerate()
            .filter_map(|(pos, bug)| bug.id.map(|id| (id, pos)))
            .collect();
        Self { bugs, index }
    }

    #[must_use]
    pub fn bugs(&self) -> &[Bug] {
        &self.bugs
    }

    #[must_use]
    pub fn get(&self, id: BugId) -> Option<&Bug> {
        self.index.get(&id).map(|&pos| &self.bugs[pos])
    }

    #[must_use]
    pub fn contains(&self, id: BugId) -> bool {
        self.index.contains_key(&id)
    }

    /// Indexed ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<BugId> {
        let mut ids: Vec<BugId> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bugs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bugs.is_empty()
    }

    #[must_use]
    pub fn into_bugs(self) -> Vec<Bug> {
        self.bugs
    }
}

impl From<Vec<Bug>> for Snapshot {
    fn from(bugs: Vec<Bug>) -> Self {
        Self::new(bugs)
    }
}

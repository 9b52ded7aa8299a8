//! Filtering a session's bugs for listing and search.

use crate::model::{Bug, Severity, Status};

/// Filter criteria for bug listings.
///
/// All fields are optional and combine with AND semantics. Text fields match
/// case-insensitive substrings; blank text counts as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BugFilter {
    /// Must appear in the title or the description.
    pub text: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<Status>,
    /// Must appear in the reporter's name.
    pub reporter: Option<String>,
    /// Must appear in the solver's name; bugs without a solver never match.
    pub solver: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

fn needle(text: Option<&String>) -> Option<String> {
    text.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty())
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl BugFilter {
    /// Whether no criterion is set. The limit does not count.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        needle(self.text.as_ref()).is_none()
            && self.severity.is_none()
            && self.status.is_none()
            && needle(self.reporter.as_ref()).is_none()
            && needle(self.solver.as_ref()).is_none()
    }

    #[must_use]
    pub fn matches(&self, bug: &Bug) -> bool {
        if self.severity.is_some_and(|s| s != bug.severity) {
            return false;
        }
        if self.status.is_some_and(|s| s != bug.status) {
            return false;
        }
        if let Some(text) = needle(self.text.as_ref())
            && !(contains(&bug.title, &text) || contains(&bug.description, &text))
        {
            return false;
        }
        if let Some(reporter) = needle(self.reporter.as_ref())
            && !contains(&bug.reporter_name, &reporter)
        {
            return false;
        }
        if let Some(solver) = needle(self.solver.as_ref()) {
            return bug
                .solver_name
                .as_deref()
                .is_some_and(|name| contains(name, &solver));
        }
        true
    }

    /// Matching bugs in their original order, cut at the limit.
    #[must_use]
    pub fn apply<'a>(&self, bugs: &'a [Bug]) -> Vec<&'a Bug> {
        bugs.iter()
            .filter(|bug| self.matches(bug))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

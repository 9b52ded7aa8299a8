use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Store-assigned bug identifier.
pub type BugId = i64;

/// How bad a reported bug is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// The three lifecycle states of a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    InProgress,
    Resolved,
}

impl Status {
    const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
        }
    }

    /// Validate whether a transition from self to `target` is allowed.
    ///
    /// Valid transitions:
    /// - `NEW -> IN_PROGRESS` (claim)
    /// - `NEW -> RESOLVED`
    /// - `IN_PROGRESS -> RESOLVED`
    /// - `RESOLVED -> IN_PROGRESS` (reopen)
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for no-op transitions and anything not
    /// listed above.
    pub fn can_transition_to(self, target: Self) -> Result<(), InvalidTransition> {
        if self == target {
            return Err(InvalidTransition {
                from: self,
                to: target,
                reason: "no-op transition is not allowed",
            });
        }

        let allowed = matches!(
            (self, target),
            (Self::New, Self::InProgress)
                | (Self::New | Self::InProgress, Self::Resolved)
                | (Self::Resolved, Self::InProgress)
        );

        if allowed {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
                reason: "transition not allowed by lifecycle rules",
            })
        }
    }
}

/// A bug as stored in the remote `bugs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bug {
    /// Absent until the store has persisted the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BugId>,
    pub session_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: Status,
    pub reporter_name: String,
    #[serde(default)]
    pub solver_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bug {
    /// Open means anything that is not resolved.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status != Status::Resolved
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == Status::Resolved
    }

    /// Title and description joined by a single space.
    #[must_use]
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Validated fields for a new bug report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBug {
    pub session_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub reporter_name: String,
}

impl NewBug {
    /// Trim and validate report fields.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the session, title, description or
    /// reporter is blank after trimming.
    pub fn new(
        session_id: &str,
        title: &str,
        description: &str,
        severity: Severity,
        reporter_name: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            session_id: non_blank("session_id", session_id)?,
            title: non_blank("title", title)?,
            description: non_blank("description", description)?,
            severity,
            reporter_name: non_blank("reporter_name", reporter_name)?,
        })
    }

    /// Materialize the row the store should insert.
    #[must_use]
    pub fn into_bug(self, now: DateTime<Utc>) -> Bug {
        Bug {
            id: None,
            session_id: self.session_id,
            title: self.title,
            description: self.description,
            severity: self.severity,
            status: Status::New,
            reporter_name: self.reporter_name,
            solver_name: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn non_blank(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Blank { field })
    } else {
        Ok(trimmed.to_string())
    }
}

/// A partial update to one bug row.
///
/// Only constructible through [`BugUpdate::claim`], [`BugUpdate::resolve`]
/// and [`BugUpdate::reopen`], so a status that leaves `RESOLVED` always
/// clears the solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugUpdate {
    status: Status,
    /// `Some(None)` serializes as `null` and clears the column.
    #[serde(skip_serializing_if = "Option::is_none")]
    solver_name: Option<Option<String>>,
    updated_at: DateTime<Utc>,
}

impl BugUpdate {
    /// Mark a new bug as being worked on.
    #[must_use]
    pub const fn claim(now: DateTime<Utc>) -> Self {
        Self {
            status: Status::InProgress,
            solver_name: Some(None),
            updated_at: now,
        }
    }

    /// Resolve a bug, crediting `solver`.
    #[must_use]
    pub fn resolve(solver: &str, now: DateTime<Utc>) -> Self {
        Self {
            status: Status::Resolved,
            solver_name: Some(Some(solver.trim().to_string())),
            updated_at: now,
        }
    }

    /// Reopen a resolved bug; the solver is cleared.
    #[must_use]
    pub const fn reopen(now: DateTime<Utc>) -> Self {
        Self {
            status: Status::InProgress,
            solver_name: Some(None),
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn solver_name(&self) -> Option<&str> {
        self.solver_name.as_ref().and_then(Option::as_deref)
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply this update to an in-memory row.
    pub fn apply_to(&self, bug: &mut Bug) {
        bug.status = self.status;
        if let Some(solver) = &self.solver_name {
            bug.solver_name.clone_from(solver);
        }
        if bug.status != Status::Resolved {
            bug.solver_name = None;
        }
        bug.updated_at = self.updated_at;
    }
}

/// Error returned when a state transition is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} -> {to}: {reason}")]
pub struct InvalidTransition {
    pub from: Status,
    pub to: Status,
    pub reason: &'static str,
}

/// Error returned when report fields fail validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {expected}: '{got}'")]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(ParseEnumError {
                expected: "severity",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "NEW" => Ok(Self::New),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "RESOLVED" => Ok(Self::Resolved),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn enum_json_uses_screaming_case() {
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!(
            serde_json::from_str::<Status>("\"RESOLVED\"").unwrap(),
            Status::Resolved
        );
    }

    #[test]
    fn parse_accepts_loose_spellings() {
        assert_eq!(Status::from_str("in-progress").unwrap(), Status::InProgress);
        assert_eq!(Status::from_str(" in progress ").unwrap(), Status::InProgress);
        assert_eq!(Severity::from_str("high").unwrap(), Severity::High);
        assert!(Severity::from_str("blocker").is_err());
        assert!(Status::from_str("done").is_err());
    }

    #[test]
    fn status_transition_rules() {
        assert!(Status::New.can_transition_to(Status::InProgress).is_ok());
        assert!(Status::New.can_transition_to(Status::Resolved).is_ok());
        assert!(Status::InProgress.can_transition_to(Status::Resolved).is_ok());
        assert!(Status::Resolved.can_transition_to(Status::InProgress).is_ok());

        assert!(matches!(
            Status::Resolved.can_transition_to(Status::New),
            Err(InvalidTransition {
                from: Status::Resolved,
                to: Status::New,
                ..
            })
        ));
        assert!(Status::InProgress.can_transition_to(Status::New).is_err());
        assert!(Status::New.can_transition_to(Status::New).is_err());
    }

    #[test]
    fn new_bug_trims_and_rejects_blank_fields() {
        let bug = NewBug::new("s1", "  Crash on save ", "boom", Severity::High, " Ann ").unwrap();
        assert_eq!(bug.title, "Crash on save");
        assert_eq!(bug.reporter_name, "Ann");

        assert_eq!(
            NewBug::new("s1", "   ", "boom", Severity::Low, "Ann"),
            Err(ValidationError::Blank { field: "title" })
        );
        assert_eq!(
            NewBug::new("s1", "t", "d", Severity::Low, ""),
            Err(ValidationError::Blank {
                field: "reporter_name"
            })
        );
    }

    #[test]
    fn into_bug_starts_new_without_solver() {
        let bug = NewBug::new("s1", "t", "d", Severity::Low, "Ann")
            .unwrap()
            .into_bug(at(10));
        assert_eq!(bug.status, Status::New);
        assert!(bug.id.is_none());
        assert!(bug.solver_name.is_none());
        assert_eq!(bug.created_at, bug.updated_at);
    }

    #[test]
    fn reopen_clears_solver() {
        let mut bug = NewBug::new("s1", "t", "d", Severity::Low, "Ann")
            .unwrap()
            .into_bug(at(10));
        BugUpdate::resolve("Bob", at(20)).apply_to(&mut bug);
        assert_eq!(bug.solver_name.as_deref(), Some("Bob"));
        assert!(bug.is_resolved());

        BugUpdate::reopen(at(30)).apply_to(&mut bug);
        assert_eq!(bug.status, Status::InProgress);
        assert!(bug.solver_name.is_none());
        assert_eq!(bug.updated_at, at(30));
    }

    #[test]
    fn update_serializes_null_solver_on_reopen() {
        let json = serde_json::to_value(BugUpdate::reopen(at(0))).unwrap();
        assert_eq!(json["status"], "IN_PROGRESS");
        assert!(json["solver_name"].is_null());
        assert!(json.as_object().unwrap().contains_key("solver_name"));
    }

    #[test]
    fn bug_row_deserializes_without_id_or_solver() {
        let row = r#"{
            "session_id": "s1",
            "title": "t",
            "description": "d",
            "severity": "LOW",
            "status": "NEW",
            "reporter_name": "Ann",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }"#;
        let bug: Bug = serde_json::from_str(row).unwrap();
        assert!(bug.id.is_none());
        assert!(bug.solver_name.is_none());
        assert!(bug.is_open());
    }
}

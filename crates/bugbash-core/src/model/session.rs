use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session id used when nothing else is configured.
pub const GLOBAL_SESSION_ID: &str = "global-bug-hunt-session";

/// A time-boxed bug bash event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Session {
    /// An active session starting at `now`.
    #[must_use]
    pub fn active(id: &str, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            start_time: now,
            end_time: None,
            is_active: true,
        }
    }
}

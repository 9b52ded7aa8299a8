use std::fmt;

use crate::model::BugId;

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    StoreNotConfigured,
    BugNotFound,
    InvalidStateTransition,
    InvalidBugField,
    InvalidSnapshot,
    StoreTransport,
    StoreRejected,
    Unauthorized,
    MissingIdentity,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::StoreNotConfigured => "E1002",
            Self::BugNotFound => "E2001",
            Self::InvalidStateTransition => "E2002",
            Self::InvalidBugField => "E2003",
            Self::InvalidSnapshot => "E2004",
            Self::StoreTransport => "E3001",
            Self::StoreRejected => "E3002",
            Self::Unauthorized => "E4001",
            Self::MissingIdentity => "E4002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::StoreNotConfigured => "Remote store not configured",
            Self::BugNotFound => "Bug not found",
            Self::InvalidStateTransition => "Invalid state transition",
            Self::InvalidBugField => "Invalid bug field",
            Self::InvalidSnapshot => "Invalid snapshot file",
            Self::StoreTransport => "Remote store unreachable",
            Self::StoreRejected => "Remote store rejected the request",
            Self::Unauthorized => "Not authorized",
            Self::MissingIdentity => "Participant name required",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to participants.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .bugbash/config.toml and retry."),
            Self::StoreNotConfigured => {
                Some("Set store.url in .bugbash/config.toml or BUGBASH_STORE_URL.")
            }
            Self::BugNotFound => Some("Use `bb stats` or `bb watch` to see current bug ids."),
            Self::InvalidStateTransition => {
                Some("Follow valid transitions: NEW -> IN_PROGRESS -> RESOLVED, RESOLVED -> IN_PROGRESS.")
            }
            Self::InvalidBugField => Some("Title, description and reporter must not be blank."),
            Self::InvalidSnapshot => Some("Snapshot files must be a JSON array of bug rows."),
            Self::StoreTransport => Some("Check network access; the next poll will retry."),
            Self::StoreRejected => None,
            Self::Unauthorized => Some("Only moderators may delete bugs or reset the session."),
            Self::MissingIdentity => Some("Pass --as <name> or set BUGBASH_NAME."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures reported by a remote store. Callers surface these; nothing in
/// the core retries them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network or protocol failure talking to the store.
    #[error("store transport error: {0}")]
    Transport(String),

    /// The store understood the request and refused it.
    #[error("store rejected request: {0}")]
    Validation(String),

    #[error("bug {0} not found")]
    NotFound(BugId),
}

impl StoreError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::StoreTransport,
            Self::Validation(_) => ErrorCode::StoreRejected,
            Self::NotFound(_) => ErrorCode::BugNotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, StoreError};
    use std::collections::HashSet;

    const ALL: [ErrorCode; 11] = [
        ErrorCode::ConfigParseError,
        ErrorCode::StoreNotConfigured,
        ErrorCode::BugNotFound,
        ErrorCode::InvalidStateTransition,
        ErrorCode::InvalidBugField,
        ErrorCode::InvalidSnapshot,
        ErrorCode::StoreTransport,
        ErrorCode::StoreRejected,
        ErrorCode::Unauthorized,
        ErrorCode::MissingIdentity,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let code = code.code();
            assert_eq!(code.len(), 5);
            assert!(code.starts_with('E'));
            assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn store_errors_map_to_codes() {
        assert_eq!(
            StoreError::Transport("down".into()).error_code(),
            ErrorCode::StoreTransport
        );
        assert_eq!(StoreError::NotFound(7).error_code(), ErrorCode::BugNotFound);
        assert_eq!(StoreError::NotFound(7).to_string(), "bug 7 not found");
    }
}

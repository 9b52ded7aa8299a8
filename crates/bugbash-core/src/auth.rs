//! Authorization for write actions.
//!
//! Participants are identified by a typed name only. Destructive actions
//! (deleting bugs, resetting a session) can be gated behind a moderator list
//! whose credentials are stored as SHA-256 hex digests.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::ModeratorConfig;
use crate::error::ErrorCode;

/// Who is performing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub credential: Option<String>,
}

impl Actor {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            credential: None,
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: &str) -> Self {
        self.credential = Some(credential.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Report,
    Claim,
    Resolve,
    Reopen,
    Delete,
    ResetSession,
}

impl Action {
    /// Actions that destroy data.
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::Delete | Self::ResetSession)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Claim => "claim",
            Self::Resolve => "resolve",
            Self::Reopen => "reopen",
            Self::Delete => "delete",
            Self::ResetSession => "reset-session",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("a participant name is required to {0}")]
    MissingIdentity(Action),

    #[error("{actor} is not allowed to {action}")]
    Forbidden { actor: String, action: Action },
}

impl AuthError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingIdentity(_) => ErrorCode::MissingIdentity,
            Self::Forbidden { .. } => ErrorCode::Unauthorized,
        }
    }
}

/// Decides whether an actor may perform an action.
pub trait AuthorizationPolicy {
    /// # Errors
    ///
    /// Returns [`AuthError`] when the action is not permitted.
    fn authorize(&self, actor: &Actor, action: Action) -> Result<(), AuthError>;
}

fn require_name(actor: &Actor, action: Action) -> Result<(), AuthError> {
    if actor.name.trim().is_empty() {
        Err(AuthError::MissingIdentity(action))
    } else {
        Ok(())
    }
}

/// Any named participant may do anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPolicy;

impl AuthorizationPolicy for OpenPolicy {
    fn authorize(&self, actor: &Actor, action: Action) -> Result<(), AuthError> {
        require_name(actor, action)
    }
}

/// Destructive actions need a configured moderator with a matching credential.
#[derive(Debug, Clone, Default)]
pub struct ModeratorPolicy {
    moderators: Vec<ModeratorConfig>,
}

impl ModeratorPolicy {
    #[must_use]
    pub fn new(moderators: &[ModeratorConfig]) -> Self {
        Self {
            moderators: moderators.to_vec(),
        }
    }

    fn is_moderator(&self, actor: &Actor) -> bool {
        let Some(credential) = actor.credential.as_deref() else {
            return false;
        };
        let digest = credential_digest(credential);
        self.moderators.iter().any(|m| {
            m.name == actor.name && m.credential_sha256.trim().eq_ignore_ascii_case(&digest)
        })
    }
}

impl AuthorizationPolicy for ModeratorPolicy {
    fn authorize(&self, actor: &Actor, action: Action) -> Result<(), AuthError> {
        require_name(actor, action)?;
        if action.is_destructive() && !self.is_moderator(actor) {
            tracing::warn!(actor = %actor.name, %action, "destructive action denied");
            return Err(AuthError::Forbidden {
                actor: actor.name.clone(),
                action,
            });
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of a credential, as stored in `[[moderators]]`.
#[must_use]
pub fn credential_digest(credential: &str) -> String {
    format!("{:x}", Sha256::digest(credential.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ModeratorPolicy {
        ModeratorPolicy::new(&[ModeratorConfig {
            name: "admin".into(),
            credential_sha256: credential_digest("hunter2"),
        }])
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            credential_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn everyone_needs_a_name() {
        let anon = Actor::named("   ");
        assert_eq!(
            OpenPolicy.authorize(&anon, Action::Report),
            Err(AuthError::MissingIdentity(Action::Report))
        );
        assert!(policy().authorize(&anon, Action::Claim).is_err());
    }

    #[test]
    fn open_policy_allows_destructive_actions() {
        assert!(OpenPolicy.authorize(&Actor::named("Ann"), Action::Delete).is_ok());
    }

    #[test]
    fn moderator_policy_gates_destructive_actions() {
        let policy = policy();
        let ann = Actor::named("Ann");
        assert!(policy.authorize(&ann, Action::Resolve).is_ok());

        let err = policy.authorize(&ann, Action::Delete).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Unauthorized);
        assert_eq!(err.to_string(), "Ann is not allowed to delete");

        let admin = Actor::named("admin").with_credential("hunter2");
        assert!(policy.authorize(&admin, Action::Delete).is_ok());
        assert!(policy.authorize(&admin, Action::ResetSession).is_ok());
    }

    #[test]
    fn moderator_needs_matching_credential_and_name() {
        let policy = policy();
        let wrong_secret = Actor::named("admin").with_credential("guess");
        assert!(policy.authorize(&wrong_secret, Action::Delete).is_err());

        let no_secret = Actor::named("admin");
        assert!(policy.authorize(&no_secret, Action::ResetSession).is_err());

        let wrong_name = Actor::named("Ann").with_credential("hunter2");
        assert!(policy.authorize(&wrong_name, Action::Delete).is_err());
    }
}

//! Write operations on bugs.
//!
//! Every action is authorized, validated against the lifecycle rules and then
//! sent to the store. Nothing here touches a local snapshot: the change comes
//! back through the sync controller like any other participant's write.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::auth::{Action, Actor, AuthError, AuthorizationPolicy};
use crate::bus::NotificationBus;
use crate::error::{ErrorCode, StoreError};
use crate::model::{Bug, BugId, BugUpdate, InvalidTransition, NewBug, Severity, Status, ValidationError};
use crate::store::RemoteStore;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bug has not been stored yet")]
    Unpersisted,
}

impl ActionError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Auth(err) => err.error_code(),
            Self::Validation(_) => ErrorCode::InvalidBugField,
            Self::Transition(_) => ErrorCode::InvalidStateTransition,
            Self::Store(err) => err.error_code(),
            Self::Unpersisted => ErrorCode::BugNotFound,
        }
    }
}

/// Report/claim/resolve/reopen/delete/reset against one session.
#[derive(Debug)]
pub struct BugActions<S, P> {
    store: S,
    policy: P,
    session_id: String,
    bus: NotificationBus,
}

impl<S: RemoteStore, P: AuthorizationPolicy> BugActions<S, P> {
    #[must_use]
    pub fn new(store: S, policy: P, session_id: &str) -> Self {
        Self {
            store,
            policy,
            session_id: session_id.to_string(),
            bus: NotificationBus::disabled(),
        }
    }

    /// Announce session resets on `bus` so other surfaces on this host
    /// re-baseline straight away.
    #[must_use]
    pub fn with_bus(mut self, bus: NotificationBus) -> Self {
        self.bus = bus;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// File a new bug under the actor's name.
    ///
    /// # Errors
    ///
    /// Fails on authorization, blank fields or a store error.
    pub fn report(
        &self,
        actor: &Actor,
        title: &str,
        description: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Result<Bug, ActionError> {
        self.policy.authorize(actor, Action::Report)?;
        let bug = NewBug::new(&self.session_id, title, description, severity, &actor.name)?;
        let stored = self.store.insert_bug(&bug, now)?;
        info!(id = ?stored.id, reporter = %actor.name, %severity, "bug reported");
        Ok(stored)
    }

    /// Mark a `NEW` bug as in progress.
    ///
    /// # Errors
    ///
    /// Fails on authorization, a bug that is not `NEW`, or a store error.
    pub fn claim(&self, actor: &Actor, bug: &Bug, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.policy.authorize(actor, Action::Claim)?;
        if bug.status != Status::New {
            return Err(InvalidTransition {
                from: bug.status,
                to: Status::InProgress,
                reason: "only new bugs can be claimed",
            }
            .into());
        }
        self.write(bug, &BugUpdate::claim(now))
    }

    /// Resolve a bug, crediting the actor.
    ///
    /// # Errors
    ///
    /// Fails on authorization, an already resolved bug, or a store error.
    pub fn resolve(&self, actor: &Actor, bug: &Bug, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.policy.authorize(actor, Action::Resolve)?;
        bug.status.can_transition_to(Status::Resolved)?;
        self.write(bug, &BugUpdate::resolve(&actor.name, now))
    }

    /// Send a resolved bug back to in progress, clearing its solver.
    ///
    /// # Errors
    ///
    /// Fails on authorization, a bug that is not resolved, or a store error.
    pub fn reopen(&self, actor: &Actor, bug: &Bug, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.policy.authorize(actor, Action::Reopen)?;
        if bug.status != Status::Resolved {
            return Err(InvalidTransition {
                from: bug.status,
                to: Status::InProgress,
                reason: "only resolved bugs can be reopened",
            }
            .into());
        }
        self.write(bug, &BugUpdate::reopen(now))
    }

    /// Remove one bug. Deleting an already deleted id succeeds.
    ///
    /// # Errors
    ///
    /// Fails on authorization or a store error.
    pub fn delete(&self, actor: &Actor, id: BugId) -> Result<(), ActionError> {
        self.policy.authorize(actor, Action::Delete)?;
        self.store.delete_bug(id)?;
        info!(id, by = %actor.name, "bug deleted");
        Ok(())
    }

    /// Clear the session and every bug in it, then announce the reset on
    /// the bus.
    ///
    /// # Errors
    ///
    /// Fails on authorization or a store error.
    pub fn reset_session(&self, actor: &Actor) -> Result<(), ActionError> {
        self.policy.authorize(actor, Action::ResetSession)?;
        self.store.clear_session(&self.session_id)?;
        self.bus.announce_reset(&self.session_id);
        info!(session = %self.session_id, by = %actor.name, "session reset");
        Ok(())
    }

    fn write(&self, bug: &Bug, update: &BugUpdate) -> Result<(), ActionError> {
        let id = bug.id.ok_or(ActionError::Unpersisted)?;
        self.store.update_bug(id, update)?;
        info!(id, status = %update.status(), "bug updated");
        Ok(())
    }
}

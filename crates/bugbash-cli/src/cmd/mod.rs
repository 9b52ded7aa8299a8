pub mod completions;
pub mod delete;
pub mod diff;
pub mod dups;
pub mod list;
pub mod report;
pub mod reset;
pub mod stats;
pub mod transition;
pub mod watch;

use std::path::Path;

use anyhow::Context as _;
use bugbash_core::ErrorCode;
use bugbash_core::auth::{Actor, ModeratorPolicy};
use bugbash_core::config::EffectiveConfig;
use bugbash_core::model::{Bug, BugId};
use bugbash_core::store::RemoteStore;

use crate::identity;
use crate::output::{CliError, OutputMode, render_error};
use crate::rest::RestStore;

/// Everything a command needs besides its own arguments.
#[derive(Debug)]
pub struct Context {
    pub config: EffectiveConfig,
    pub output: OutputMode,
    /// `--session` flag, else `store.session` after env overrides.
    pub session: String,
    pub name_flag: Option<String>,
    pub credential_flag: Option<String>,
    pub quiet: bool,
}

impl Context {
    /// The acting participant; renders the error when none is set.
    pub fn actor(&self) -> anyhow::Result<Actor> {
        identity::require_actor(
            self.name_flag.as_deref(),
            self.credential_flag.as_deref(),
            self.config.user.name.as_deref(),
        )
        .or_else(|err| fail(self.output, &CliError::coded(err.code, err.message)))
    }

    pub fn policy(&self) -> ModeratorPolicy {
        ModeratorPolicy::new(&self.config.project.moderators)
    }

    /// The configured remote store; renders `E1002` when there is none.
    pub fn remote_store(&self) -> anyhow::Result<RestStore> {
        match RestStore::from_config(&self.config.project.store) {
            Some(store) => Ok(store),
            None => fail(self.output, &CliError::from(ErrorCode::StoreNotConfigured)),
        }
    }
}

/// Render `error` to stderr and return it as a command failure.
pub fn fail<T>(output: OutputMode, error: &CliError) -> anyhow::Result<T> {
    render_error(output, error)?;
    anyhow::bail!("{}", error.message)
}

/// Read a JSON array of bug rows in the store's wire format.
pub fn read_snapshot_file(path: &Path, output: OutputMode) -> anyhow::Result<Vec<Bug>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str::<Vec<Bug>>(&content) {
        Ok(bugs) => Ok(bugs),
        Err(err) => fail(
            output,
            &CliError::coded(
                ErrorCode::InvalidSnapshot,
                format!("{}: {err}", path.display()),
            ),
        ),
    }
}

/// Bugs from `file` when given, otherwise from the remote session.
pub fn load_bugs(ctx: &Context, file: Option<&Path>) -> anyhow::Result<Vec<Bug>> {
    if let Some(path) = file {
        return read_snapshot_file(path, ctx.output);
    }
    let store = ctx.remote_store()?;
    fetch_session(ctx, &store)
}

pub fn fetch_session(ctx: &Context, store: &impl RemoteStore) -> anyhow::Result<Vec<Bug>> {
    match store.fetch_bugs(&ctx.session) {
        Ok(bugs) => Ok(bugs),
        Err(err) => fail(ctx.output, &CliError::coded(err.error_code(), err.to_string())),
    }
}

/// Look up one bug of the current session by id.
pub fn find_bug(ctx: &Context, store: &impl RemoteStore, id: BugId) -> anyhow::Result<Bug> {
    let bugs = fetch_session(ctx, store)?;
    match bugs.into_iter().find(|b| b.id == Some(id)) {
        Some(bug) => Ok(bug),
        None => fail(
            ctx.output,
            &CliError::coded(
                ErrorCode::BugNotFound,
                format!("bug {id} not found in session {}", ctx.session),
            ),
        ),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bugbash_core::memory::MemoryStore;
    use bugbash_core::model::{NewBug, Severity};
    use chrono::Utc;

    #[test]
    fn find_bug_scopes_to_session() {
        let store = MemoryStore::new();
        let bug = NewBug::new("s1", "Crash", "on save", Severity::High, "Ann").expect("valid");
        let stored = store.insert_bug(&bug, Utc::now()).expect("insert");
        let id = stored.id.expect("id");

        let found = find_bug(&test_support::context("s1"), &store, id).expect("found");
        assert_eq!(found.title, "Crash");
        assert!(find_bug(&test_support::context("s2"), &store, id).is_err());
    }

    #[test]
    fn snapshot_file_must_be_bug_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").expect("write");
        let err = read_snapshot_file(&path, OutputMode::Json).expect_err("invalid");
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn missing_store_url_is_an_error() {
        let ctx = test_support::context("s");
        assert!(ctx.remote_store().is_err());
    }
}

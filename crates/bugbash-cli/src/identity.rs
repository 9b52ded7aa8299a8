//! Participant identity for write commands.
//!
//! Name chain: `--as` flag > `BUGBASH_NAME` env > `name` in the user config >
//! `USER` env (TTY only). Moderator credential: `--credential` flag >
//! `BUGBASH_CREDENTIAL` env. Read-only commands never need an identity.

use std::env;

use bugbash_core::ErrorCode;
use bugbash_core::auth::Actor;

/// No participant name could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct IdentityError {
    pub message: String,
    pub code: ErrorCode,
}

trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn resolve_name_with(
    cli_flag: Option<&str>,
    config_name: Option<&str>,
    env: &dyn EnvReader,
) -> Option<String> {
    non_blank(cli_flag)
        .or_else(|| env.get("BUGBASH_NAME"))
        .or_else(|| non_blank(config_name))
        .or_else(|| env.is_tty().then(|| env.get("USER")).flatten())
}

fn resolve_credential_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    non_blank(cli_flag).or_else(|| env.get("BUGBASH_CREDENTIAL"))
}

fn require_actor_with(
    cli_name: Option<&str>,
    cli_credential: Option<&str>,
    config_name: Option<&str>,
    env: &dyn EnvReader,
) -> Result<Actor, IdentityError> {
    let name = resolve_name_with(cli_name, config_name, env).ok_or_else(|| IdentityError {
        message: "A participant name is required for this command. \
                  Set --as or the BUGBASH_NAME environment variable."
            .to_string(),
        code: ErrorCode::MissingIdentity,
    })?;
    let actor = Actor::named(&name);
    Ok(match resolve_credential_with(cli_credential, env) {
        Some(credential) => actor.with_credential(&credential),
        None => actor,
    })
}

/// Resolve the acting participant, failing when no name is available.
///
/// # Errors
///
/// Returns [`IdentityError`] when every source in the chain is empty.
pub fn require_actor(
    cli_name: Option<&str>,
    cli_credential: Option<&str>,
    config_name: Option<&str>,
) -> Result<Actor, IdentityError> {
    require_actor_with(cli_name, cli_credential, config_name, &RealEnv)
}

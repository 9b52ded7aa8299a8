//! [`RemoteStore`] over a PostgREST HTTP endpoint.
//!
//! Tables live under `{base}/rest/v1/`. Every request carries the API key
//! both as `apikey` and as a bearer token. A 4xx reply means the store
//! refused the request; anything else that fails is a transport error.

use std::time::Duration;

use bugbash_core::StoreError;
use bugbash_core::config::StoreConfig;
use bugbash_core::model::{Bug, BugId, BugUpdate, NewBug, Session};
use bugbash_core::store::RemoteStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

pub struct RestStore {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl RestStore {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("bugbash-cli/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Build from `[store]`, reading the key from the configured env var.
    /// Returns `None` when no URL is configured.
    pub fn from_config(config: &StoreConfig) -> Option<Self> {
        let url = config.url.as_deref()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Some(Self::new(
            url,
            api_key,
            Duration::from_millis(config.request_timeout_ms),
        ))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: &str, table: &str) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, &self.table_url(table))
            .set("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request
                .set("apikey", key)
                .set("Authorization", &format!("Bearer {key}"));
        }
        request
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Map a non-success HTTP status to a store error.
fn status_error(code: u16, body: &str) -> StoreError {
    let detail = if body.trim().is_empty() {
        format!("HTTP {code}")
    } else {
        format!("HTTP {code}: {}", body.trim())
    };
    if (400..500).contains(&code) {
        StoreError::Validation(detail)
    } else {
        StoreError::Transport(detail)
    }
}

fn map_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            status_error(code, &body)
        }
        ureq::Error::Transport(transport) => StoreError::Transport(transport.to_string()),
    }
}

fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T, StoreError> {
    response
        .into_json::<T>()
        .map_err(|err| StoreError::Transport(format!("invalid response body: {err}")))
}

impl RemoteStore for RestStore {
    fn fetch_bugs(&self, session_id: &str) -> Result<Vec<Bug>, StoreError> {
        let response = self
            .request("GET", "bugs")
            .query("session_id", &eq(session_id))
            .query("order", "created_at.desc")
            .call()
            .map_err(map_error)?;
        let bugs: Vec<Bug> = decode(response)?;
        debug!(session = session_id, count = bugs.len(), "fetched bugs");
        Ok(bugs)
    }

    fn insert_bug(&self, bug: &NewBug, now: DateTime<Utc>) -> Result<Bug, StoreError> {
        let row = bug.clone().into_bug(now);
        let response = self
            .request("POST", "bugs")
            .set("Prefer", "return=representation")
            .send_json(&row)
            .map_err(map_error)?;
        let mut rows: Vec<Bug> = decode(response)?;
        rows.pop()
            .ok_or_else(|| StoreError::Transport("insert returned no row".to_string()))
    }

    fn update_bug(&self, id: BugId, update: &BugUpdate) -> Result<(), StoreError> {
        let response = self
            .request("PATCH", "bugs")
            .query("id", &eq(id))
            .set("Prefer", "return=representation")
            .send_json(update)
            .map_err(map_error)?;
        let rows: Vec<Bug> = decode(response)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete_bug(&self, id: BugId) -> Result<(), StoreError> {
        self.request("DELETE", "bugs")
            .query("id", &eq(id))
            .call()
            .map_err(map_error)?;
        Ok(())
    }

    fn upsert_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let session = Session::active(session_id, session_id, now);
        self.request("POST", "sessions")
            .set("Prefer", "resolution=merge-duplicates")
            .send_json(&session)
            .map_err(map_error)?;
        Ok(())
    }

    fn session_exists(&self, session_id: &str) -> Result<bool, StoreError> {
        let response = self
            .request("GET", "sessions")
            .query("id", &eq(session_id))
            .query("select", "id")
            .call()
            .map_err(map_error)?;
        let rows: Vec<serde_json::Value> = decode(response)?;
        Ok(!rows.is_empty())
    }

    fn clear_session(&self, session_id: &str) -> Result<(), StoreError> {
        // Session row first: watchers that see the empty bug list must also
        // see the session gone, or they take the clear for plain deletes.
        self.request("DELETE", "sessions")
            .query("id", &eq(session_id))
            .call()
            .map_err(map_error)?;
        self.request("DELETE", "bugs")
            .query("session_id", &eq(session_id))
            .call()
            .map_err(map_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_rejections() {
        assert_eq!(
            status_error(409, "duplicate key"),
            StoreError::Validation("HTTP 409: duplicate key".to_string())
        );
        assert_eq!(
            status_error(400, "  "),
            StoreError::Validation("HTTP 400".to_string())
        );
    }

    #[test]
    fn server_errors_are_transport() {
        assert!(matches!(status_error(503, ""), StoreError::Transport(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let store = RestStore::new("https://db.test/", None, Duration::from_secs(1));
        assert_eq!(store.table_url("bugs"), "https://db.test/rest/v1/bugs");
    }

    #[test]
    fn missing_url_yields_no_store() {
        assert!(RestStore::from_config(&StoreConfig::default()).is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let store = RestStore::new("https://db.test", Some("k3y".into()), Duration::from_secs(1));
        let debug = format!("{store:?}");
        assert!(!debug.contains("k3y"));
        assert!(debug.contains("redacted"));
    }
}

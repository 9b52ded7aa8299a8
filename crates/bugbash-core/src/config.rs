use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::model::GLOBAL_SESSION_ID;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
    #[serde(default)]
    pub gamification: GamificationConfig,
    #[serde(default)]
    pub moderators: Vec<ModeratorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the PostgREST endpoint; unset means offline only.
    #[serde(default)]
    pub url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key_env: default_api_key_env(),
            session: default_session(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
    #[serde(default = "default_resubscribe_interval_ms")]
    pub resubscribe_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
            resubscribe_interval_ms: default_resubscribe_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatesConfig {
    #[serde(default = "default_title_threshold")]
    pub title_threshold: f64,
    #[serde(default = "default_combined_threshold")]
    pub combined_threshold: f64,
    #[serde(default = "default_true")]
    pub require_same_severity: bool,
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            title_threshold: default_title_threshold(),
            combined_threshold: default_combined_threshold(),
            require_same_severity: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationConfig {
    #[serde(default = "default_milestone_every")]
    pub milestone_every: usize,
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
    #[serde(default = "default_boss_fight_threshold")]
    pub boss_fight_threshold: usize,
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            milestone_every: default_milestone_every(),
            leaderboard_size: default_leaderboard_size(),
            boss_fight_threshold: default_boss_fight_threshold(),
        }
    }
}

/// A participant allowed to delete bugs and reset the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorConfig {
    pub name: String,
    /// Lowercase hex SHA-256 of the moderator's credential.
    pub credential_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Default participant name when `--as` and `BUGBASH_NAME` are unset.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
}

impl ProjectConfig {
    /// Apply `BUGBASH_STORE_URL` and `BUGBASH_SESSION` from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("BUGBASH_STORE_URL").filter(|v| !v.trim().is_empty()) {
            self.store.url = Some(url.trim().to_string());
        }
        if let Some(session) = lookup("BUGBASH_SESSION").filter(|v| !v.trim().is_empty()) {
            self.store.session = session.trim().to_string();
        }
    }
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".bugbash/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("bugbash/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Project config with env overrides applied, plus the user config.
pub fn resolve_config(project_root: &Path) -> Result<EffectiveConfig> {
    let mut project = load_project_config(project_root)?;
    project.apply_env_overrides(|key| env::var(key).ok());
    let user = load_user_config()?;
    Ok(EffectiveConfig { project, user })
}

const fn default_true() -> bool {
    true
}

fn default_api_key_env() -> String {
    "BUGBASH_API_KEY".to_string()
}

fn default_session() -> String {
    GLOBAL_SESSION_ID.to_string()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_poll_interval_ms() -> u64 {
    3_000
}

const fn default_subscribe_timeout_ms() -> u64 {
    10_000
}

const fn default_resubscribe_interval_ms() -> u64 {
    30_000
}

const fn default_title_threshold() -> f64 {
    0.6
}

const fn default_combined_threshold() -> f64 {
    0.5
}

const fn default_milestone_every() -> usize {
    5
}

const fn default_leaderboard_size() -> usize {
    10
}

const fn default_boss_fight_threshold() -> usize {
    3
}

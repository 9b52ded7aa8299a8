//! Live view of a session's bugs.
//!
//! The [`SyncController`] keeps a local snapshot current using a realtime
//! subscription and falls back to periodic polling whenever the feed is
//! unhealthy. It is a synchronous state machine: the caller advances it with
//! [`SyncController::tick`] and a monotonic millisecond clock, which keeps
//! every timing decision deterministic under test.
//!
//! ```text
//! Uninitialized --start--> Subscribing --Subscribed--> Live
//!                              |                        |
//!                 error/timeout/closed          error/closed
//!                              v                        v
//!                              +-------> Polling <------+
//!                                           |
//!                                  resubscribe succeeds --> Live
//! any --teardown--> Closed
//! ```

pub mod controller;

pub use controller::{FetchTicket, ListenerId, SyncController, SyncState, SyncView};

use crate::config::{GamificationConfig, SyncConfig};

/// Timing knobs for the controller, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub poll_interval_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub resubscribe_interval_ms: u64,
    /// Resolutions per milestone event; zero disables milestones.
    pub milestone_every: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default(), &GamificationConfig::default())
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn from_config(sync: &SyncConfig, gamification: &GamificationConfig) -> Self {
        Self {
            poll_interval_ms: sync.poll_interval_ms,
            subscribe_timeout_ms: sync.subscribe_timeout_ms,
            resubscribe_interval_ms: sync.resubscribe_interval_ms,
            milestone_every: gamification.milestone_every,
        }
    }
}

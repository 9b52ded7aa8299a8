//! bugbash-core library.
//!
//! # Conventions
//!
//! - **Errors**: library errors are `thiserror` enums carrying an
//!   [`error::ErrorCode`]; config loading returns `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Time**: wall-clock timestamps are `chrono::DateTime<Utc>`; the sync
//!   controller is driven by a caller-supplied monotonic millisecond clock.
#![forbid(unsafe_code)]

pub mod actions;
pub mod auth;
pub mod bus;
pub mod config;
pub mod diff;
pub mod error;
pub mod event;
pub mod memory;
pub mod model;
pub mod query;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod sync;

pub use error::{ErrorCode, StoreError};
pub use event::{DomainEvent, EventKind};
pub use snapshot::Snapshot;

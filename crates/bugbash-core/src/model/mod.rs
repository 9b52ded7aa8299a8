//! Data model shared by every bugbash crate.

pub mod bug;
pub mod session;

pub use bug::{
    Bug, BugId, BugUpdate, InvalidTransition, NewBug, ParseEnumError, Severity, Status,
    ValidationError,
};
pub use session::{GLOBAL_SESSION_ID, Session};

//! Data models
//!
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY, snowflake generated).
//! All timestamps are Unix milliseconds.

pub mod activity;
pub mod listing;
pub mod money;
pub mod offer;
pub mod reservation;

// Re-exports
pub use activity::*;
pub use listing::*;
pub use money::*;
pub use offer::*;
pub use reservation::*;

/// A stored status string that does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownStatus {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

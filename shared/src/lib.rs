//! Shared types for the offer negotiation engine
//!
//! Domain models, notification kinds, the unified error system and the
//! result structures returned across the engine boundary.

pub mod error;
pub mod models;
pub mod notification;
pub mod response;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCode};
pub use notification::{Notification, NotificationKind};
pub use response::{BatchOutcome, OfferActionResult, ReservationResult};

//! Boundary result types
//!
//! Engine operations never return `Err` to their callers: failures are values
//! with `success = false`, a user-facing message and the error code.

use crate::error::{AppError, ErrorCode};
use serde::{Deserialize, Serialize};

/// Result of an offer operation (create, accept, reject, counter, withdraw, expire)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Offer the operation acted on (or created)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<i64>,
    /// Counter-offer created by `counter`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_offer_id: Option<i64>,
    /// Expiry of the created offer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Reservation created by `accept`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_until: Option<i64>,
    /// Conditional accept: downstream code must gate on this flag
    #[serde(default)]
    pub requires_deposit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_deadline: Option<i64>,
    /// Expiry of the reservation that blocked an accept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_expires_at: Option<i64>,
}

impl OfferActionResult {
    pub fn ok(offer_id: i64) -> Self {
        Self {
            success: true,
            offer_id: Some(offer_id),
            ..Default::default()
        }
    }

    pub fn failed(err: &AppError) -> Self {
        Self {
            success: false,
            error: Some(err.message.clone()),
            error_code: Some(err.code),
            conflict_expires_at: conflict_expiry(err),
            ..Default::default()
        }
    }
}

/// Result of a reservation operation (create, complete, cancel, extend, expire)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i64>,
    /// Expiry after the operation (create, extend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_expires_at: Option<i64>,
}

impl ReservationResult {
    pub fn ok(reservation_id: i64) -> Self {
        Self {
            success: true,
            reservation_id: Some(reservation_id),
            ..Default::default()
        }
    }

    pub fn failed(err: &AppError) -> Self {
        Self {
            success: false,
            error: Some(err.message.clone()),
            error_code: Some(err.code),
            conflict_expires_at: conflict_expiry(err),
            ..Default::default()
        }
    }
}

fn conflict_expiry(err: &AppError) -> Option<i64> {
    if err.is_conflict() {
        err.detail("existing_expires_at").and_then(|v| v.as_i64())
    } else {
        None
    }
}

/// Per-row accounting of a batch operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Rows the batch tried to transition
    pub attempted: u32,
    /// Rows actually transitioned by this run
    pub processed: u32,
    /// Rows another writer already moved on
    pub skipped: u32,
    /// One message per failed row
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn error_count(&self) -> u32 {
        self.errors.len() as u32
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.attempted += other.attempted;
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

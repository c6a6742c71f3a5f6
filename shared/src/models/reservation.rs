//! Reservation Model
//!
//! A temporary exclusive hold on a listing created by an accepted offer.

use super::{Money, UnknownStatus};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus::new("reservation", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub offer_id: i64,
    /// Always equal to the accepted offer's amount
    pub amount: Money,
    pub status: ReservationStatus,
    pub expires_at: i64,
    /// Conditional accept: the hold is active but payment must capture a
    /// deposit before it can complete.
    pub deposit_required: bool,
    pub deposit_deadline: Option<i64>,
    pub payment_reference: Option<String>,
    pub completed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    /// None when cancelled by the scheduler
    pub cancelled_by: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Reservation {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub fn is_party(&self, user_id: i64) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// Create reservation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub listing_id: i64,
    pub buyer_id: i64,
    pub offer_id: i64,
    pub amount: Money,
    /// Defaults to the configured reservation window (48h)
    pub duration_hours: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// An unexpired active reservation holds the listing
    Active,
    /// A reservation on the listing completed or was cancelled within the cooldown
    Recent,
}

/// Existing reservation that blocks a new one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConflict {
    pub reservation_id: i64,
    pub kind: ConflictKind,
    pub status: ReservationStatus,
    pub expires_at: i64,
}

/// Completion payload. `deposit_captured` is the pre-authorized flag from the
/// payment side; the engine never talks to the ledger itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub deposit_captured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_str() {
        for s in [
            ReservationStatus::Active,
            ReservationStatus::Completed,
            ReservationStatus::Expired,
            ReservationStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<ReservationStatus>(), Ok(s));
        }
        let err = "held".parse::<ReservationStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown reservation status: held");
    }

    #[test]
    fn test_only_active_is_open() {
        assert!(!ReservationStatus::Active.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }
}

//! Activity log entries

use super::UnknownStatus;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Offer,
    Reservation,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Reservation => "reservation",
        }
    }
}

impl FromStr for SubjectType {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer" => Ok(Self::Offer),
            "reservation" => Ok(Self::Reservation),
            other => Err(UnknownStatus::new("subject", other)),
        }
    }
}

/// One successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    OfferCreated,
    OfferAccepted,
    OfferRejected,
    OfferCountered,
    OfferWithdrawn,
    OfferExpired,
    ReservationCreated,
    ReservationCompleted,
    ReservationCancelled,
    ReservationExpired,
    ReservationExtended,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfferCreated => "offer_created",
            Self::OfferAccepted => "offer_accepted",
            Self::OfferRejected => "offer_rejected",
            Self::OfferCountered => "offer_countered",
            Self::OfferWithdrawn => "offer_withdrawn",
            Self::OfferExpired => "offer_expired",
            Self::ReservationCreated => "reservation_created",
            Self::ReservationCompleted => "reservation_completed",
            Self::ReservationCancelled => "reservation_cancelled",
            Self::ReservationExpired => "reservation_expired",
            Self::ReservationExtended => "reservation_extended",
        }
    }

    pub fn subject_type(&self) -> SubjectType {
        match self {
            Self::OfferCreated
            | Self::OfferAccepted
            | Self::OfferRejected
            | Self::OfferCountered
            | Self::OfferWithdrawn
            | Self::OfferExpired => SubjectType::Offer,
            Self::ReservationCreated
            | Self::ReservationCompleted
            | Self::ReservationCancelled
            | Self::ReservationExpired
            | Self::ReservationExtended => SubjectType::Reservation,
        }
    }
}

impl FromStr for ActivityAction {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer_created" => Ok(Self::OfferCreated),
            "offer_accepted" => Ok(Self::OfferAccepted),
            "offer_rejected" => Ok(Self::OfferRejected),
            "offer_countered" => Ok(Self::OfferCountered),
            "offer_withdrawn" => Ok(Self::OfferWithdrawn),
            "offer_expired" => Ok(Self::OfferExpired),
            "reservation_created" => Ok(Self::ReservationCreated),
            "reservation_completed" => Ok(Self::ReservationCompleted),
            "reservation_cancelled" => Ok(Self::ReservationCancelled),
            "reservation_expired" => Ok(Self::ReservationExpired),
            "reservation_extended" => Ok(Self::ReservationExtended),
            other => Err(UnknownStatus::new("activity", other)),
        }
    }
}

/// Activity log row. `actor_id` is None for scheduler-driven transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub subject_type: SubjectType,
    pub subject_id: i64,
    pub action: ActivityAction,
    pub actor_id: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

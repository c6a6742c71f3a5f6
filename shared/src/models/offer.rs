//! Offer Model
//!
//! An offer is one proposed price for one listing. Counter-offers are new
//! rows linked to the offer they answer through `parent_offer_id`.

use super::{Money, UnknownStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Offer status
///
/// `Pending` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Countered,
    Expired,
    Withdrawn,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Countered => "countered",
            Self::Expired => "expired",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for OfferStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "countered" => Ok(Self::Countered),
            "expired" => Ok(Self::Expired),
            "withdrawn" => Ok(Self::Withdrawn),
            other => Err(UnknownStatus::new("offer", other)),
        }
    }
}

/// Side of the deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Buyer,
    Seller,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Buyer => Self::Seller,
            Self::Seller => Self::Buyer,
        }
    }
}

impl FromStr for Party {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            other => Err(UnknownStatus::new("party", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    /// Listing owner at creation time
    pub seller_id: i64,
    pub amount: Money,
    pub message: Option<String>,
    pub status: OfferStatus,
    /// Who made this offer. Buyers make original offers, sellers make counters
    /// to them and buyers may counter back.
    pub proposer: Party,
    pub expires_at: i64,
    /// Offer this one counters
    pub parent_offer_id: Option<i64>,
    pub response_message: Option<String>,
    pub rejection_reason: Option<String>,
    pub responded_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Offer {
    pub fn party_id(&self, party: Party) -> i64 {
        match party {
            Party::Buyer => self.buyer_id,
            Party::Seller => self.seller_id,
        }
    }

    pub fn proposer_id(&self) -> i64 {
        self.party_id(self.proposer)
    }

    /// The party allowed to accept, reject or counter
    pub fn responder(&self) -> Party {
        self.proposer.other()
    }

    pub fn responder_id(&self) -> i64 {
        self.party_id(self.responder())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub fn is_counter(&self) -> bool {
        self.parent_offer_id.is_some()
    }
}

/// Buyer's opening offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferCreate {
    pub listing_id: i64,
    pub buyer_id: i64,
    pub amount: Money,
    pub message: Option<String>,
}

/// Counter-offer payload; the currency follows the offer being countered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterOffer {
    pub amount: Decimal,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferRejection {
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Whether an accepted deal needs a deposit before the hold is binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepositPolicy {
    #[default]
    NotRequired,
    Required { deadline_hours: i64 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcceptOptions {
    pub message: Option<String>,
    #[serde(default)]
    pub deposit: DepositPolicy,
}

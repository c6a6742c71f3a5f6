//! Listing Model
//!
//! Listings are owned by the catalogue; this engine only drives `status`
//! and the reservation/sale stamps.

use super::{Money, UnknownStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Reserved,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Reserved => "reserved",
            Self::Sold => "sold",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "reserved" => Ok(Self::Reserved),
            "sold" => Ok(Self::Sold),
            other => Err(UnknownStatus::new("listing", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    /// Seller
    pub owner_id: i64,
    pub title: String,
    /// Asking price
    pub price: Money,
    pub status: ListingStatus,
    /// Set while reserved
    pub reserved_until: Option<i64>,
    pub sold_to: Option<i64>,
    pub sold_amount: Option<Decimal>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create listing payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingCreate {
    pub owner_id: i64,
    pub title: String,
    pub price: Money,
}

//! Notification kinds
//!
//! Every notification the engine emits is one variant of [`NotificationKind`],
//! carrying only the fields its message needs. Titles and bodies are derived
//! by exhaustive match so a new kind cannot ship without copy.

use crate::models::{Money, Party};
use crate::util::format_millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    OfferReceived {
        offer_id: i64,
        listing_id: i64,
        amount: Money,
    },
    OfferAccepted {
        offer_id: i64,
        listing_id: i64,
        amount: Money,
        reservation_id: i64,
        reserved_until: i64,
        requires_deposit: bool,
    },
    OfferRejected {
        offer_id: i64,
        listing_id: i64,
        reason: Option<String>,
    },
    OfferCountered {
        offer_id: i64,
        counter_offer_id: i64,
        listing_id: i64,
        amount: Money,
    },
    OfferExpired {
        offer_id: i64,
        listing_id: i64,
    },
    OfferExpiring {
        offer_id: i64,
        listing_id: i64,
        expires_at: i64,
    },
    ReservationCreated {
        reservation_id: i64,
        listing_id: i64,
        amount: Money,
        expires_at: i64,
    },
    ReservationCompleted {
        reservation_id: i64,
        listing_id: i64,
        amount: Money,
        /// Which side this copy is addressed to
        party: Party,
    },
    ReservationCancelled {
        reservation_id: i64,
        listing_id: i64,
        reason: Option<String>,
    },
    ReservationExpired {
        reservation_id: i64,
        listing_id: i64,
    },
}

impl NotificationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::OfferReceived { .. } => "offer_received",
            Self::OfferAccepted { .. } => "offer_accepted",
            Self::OfferRejected { .. } => "offer_rejected",
            Self::OfferCountered { .. } => "offer_countered",
            Self::OfferExpired { .. } => "offer_expired",
            Self::OfferExpiring { .. } => "offer_expiring",
            Self::ReservationCreated { .. } => "reservation_created",
            Self::ReservationCompleted { .. } => "reservation_completed",
            Self::ReservationCancelled { .. } => "reservation_cancelled",
            Self::ReservationExpired { .. } => "reservation_expired",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::OfferReceived { .. } => "New offer received",
            Self::OfferAccepted { .. } => "Offer accepted",
            Self::OfferRejected { .. } => "Offer declined",
            Self::OfferCountered { .. } => "Counter-offer received",
            Self::OfferExpired { .. } => "Offer expired",
            Self::OfferExpiring { .. } => "Offer expiring soon",
            Self::ReservationCreated { .. } => "Item reserved",
            Self::ReservationCompleted {
                party: Party::Buyer,
                ..
            } => "Purchase complete",
            Self::ReservationCompleted {
                party: Party::Seller,
                ..
            } => "Item sold",
            Self::ReservationCancelled { .. } => "Reservation cancelled",
            Self::ReservationExpired { .. } => "Reservation expired",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::OfferReceived { amount, .. } => {
                format!("You received an offer of {}.", amount)
            }
            Self::OfferAccepted {
                amount,
                reserved_until,
                requires_deposit,
                ..
            } => {
                let mut body = format!(
                    "Your offer of {} was accepted. The item is reserved for you until {}.",
                    amount,
                    format_millis(*reserved_until)
                );
                if *requires_deposit {
                    body.push_str(" A deposit is required to secure it.");
                }
                body
            }
            Self::OfferRejected { reason, .. } => match reason {
                Some(reason) => format!("Your offer was declined: {}", reason),
                None => "Your offer was declined.".to_string(),
            },
            Self::OfferCountered { amount, .. } => {
                format!("You received a counter-offer of {}.", amount)
            }
            Self::OfferExpired { .. } => "The offer expired without a response.".to_string(),
            Self::OfferExpiring { expires_at, .. } => {
                format!("An offer expires at {}.", format_millis(*expires_at))
            }
            Self::ReservationCreated {
                amount, expires_at, ..
            } => format!(
                "The item is reserved at {} until {}.",
                amount,
                format_millis(*expires_at)
            ),
            Self::ReservationCompleted {
                amount,
                party: Party::Buyer,
                ..
            } => format!("You bought the item for {}.", amount),
            Self::ReservationCompleted {
                amount,
                party: Party::Seller,
                ..
            } => format!("Your item sold for {}.", amount),
            Self::ReservationCancelled { reason, .. } => match reason {
                Some(reason) => format!("The reservation was cancelled: {}", reason),
                None => "The reservation was cancelled.".to_string(),
            },
            Self::ReservationExpired { .. } => {
                "The reservation expired and the item is available again.".to_string()
            }
        }
    }

    /// Structured payload handed to the delivery transport
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Addressed notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: i64,
    pub kind: NotificationKind,
    /// Deliveries sharing a key are collapsed into one
    pub dedup_key: Option<String>,
}

impl Notification {
    pub fn new(recipient_id: i64, kind: NotificationKind) -> Self {
        Self {
            recipient_id,
            kind,
            dedup_key: None,
        }
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn usd(n: i64) -> Money {
        Money::new(Decimal::new(n, 0), "USD")
    }

    #[test]
    fn test_tagged_serialization() {
        let kind = NotificationKind::OfferExpired {
            offer_id: 1,
            listing_id: 2,
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"type":"offer_expired","offer_id":1,"listing_id":2}"#);
        assert_eq!(kind.metadata()["type"], kind.type_name());
    }

    #[test]
    fn test_completion_copy_depends_on_party() {
        let buyer = NotificationKind::ReservationCompleted {
            reservation_id: 1,
            listing_id: 2,
            amount: usd(80),
            party: Party::Buyer,
        };
        let seller = NotificationKind::ReservationCompleted {
            reservation_id: 1,
            listing_id: 2,
            amount: usd(80),
            party: Party::Seller,
        };
        assert_eq!(buyer.title(), "Purchase complete");
        assert_eq!(seller.title(), "Item sold");
        assert_eq!(seller.body(), "Your item sold for 80.00 USD.");
    }

    #[test]
    fn test_accept_body_mentions_deposit() {
        let kind = NotificationKind::OfferAccepted {
            offer_id: 1,
            listing_id: 2,
            amount: usd(80),
            reservation_id: 3,
            reserved_until: 0,
            requires_deposit: true,
        };
        let body = kind.body();
        assert!(body.contains("80.00 USD"));
        assert!(body.contains("1970-01-01T00:00:00Z"));
        assert!(body.ends_with("A deposit is required to secure it."));
    }

    #[test]
    fn test_dedup_key() {
        let n = Notification::new(
            9,
            NotificationKind::OfferExpiring {
                offer_id: 1,
                listing_id: 2,
                expires_at: 0,
            },
        )
        .with_dedup_key("offer_expiring:1:buyer");
        assert_eq!(n.dedup_key.as_deref(), Some("offer_expiring:1:buyer"));
    }
}

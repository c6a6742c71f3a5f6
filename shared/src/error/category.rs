//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category, determined by the leading digit of the error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Permission errors (2xxx)
    Permission,
    /// Offer errors (4xxx)
    Offer,
    /// Reservation errors (5xxx)
    Reservation,
    /// Listing errors (6xxx)
    Listing,
    /// System errors (9xxx and anything unassigned)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            2000..3000 => Self::Permission,
            4000..5000 => Self::Offer,
            5000..6000 => Self::Reservation,
            6000..7000 => Self::Listing,
            _ => Self::System,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Permission => "permission",
            Self::Offer => "offer",
            Self::Reservation => "reservation",
            Self::Listing => "listing",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::Permission);
        assert_eq!(ErrorCategory::from_code(4001), ErrorCategory::Offer);
        assert_eq!(ErrorCategory::from_code(5004), ErrorCategory::Reservation);
        assert_eq!(ErrorCategory::from_code(6002), ErrorCategory::Listing);
        assert_eq!(ErrorCategory::from_code(1500), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::NotOfferResponder.category(),
            ErrorCategory::Permission
        );
        assert_eq!(ErrorCode::OfferExpired.category(), ErrorCategory::Offer);
        assert_eq!(
            ErrorCode::ReservationConflict.category(),
            ErrorCategory::Reservation
        );
        assert_eq!(
            ErrorCode::ListingNotAvailable.category(),
            ErrorCategory::Listing
        );
        assert_eq!(ErrorCode::DatabaseError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Reservation).unwrap();
        assert_eq!(json, "\"reservation\"");
        let category: ErrorCategory = serde_json::from_str("\"listing\"").unwrap();
        assert_eq!(category, ErrorCategory::Listing);
        assert_eq!(category.name(), "listing");
    }
}

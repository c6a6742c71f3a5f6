//! Error codes for the negotiation engine
//!
//! - 0xxx: General errors
//! - 2xxx: Permission errors
//! - 4xxx: Offer errors
//! - 5xxx: Reservation errors
//! - 6xxx: Listing errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Represented as u16 on the wire so callers in any language can switch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 2xxx: Permission ====================
    /// Actor is not allowed to perform this action
    PermissionDenied = 2001,
    /// Only the party receiving the offer may respond to it
    NotOfferResponder = 2002,
    /// Only the party who made the offer may withdraw it
    NotOfferProposer = 2003,
    /// Actor is neither buyer nor seller of the reservation
    NotReservationParty = 2004,

    // ==================== 4xxx: Offer ====================
    /// Offer not found
    OfferNotFound = 4001,
    /// Offer is no longer pending
    OfferNotPending = 4002,
    /// Offer has expired
    OfferExpired = 4003,
    /// Offer amount must be positive
    OfferInvalidAmount = 4004,
    /// Counter-offer must be below the asking price
    CounterExceedsPrice = 4005,
    /// Currency does not match the listing
    CurrencyMismatch = 4006,
    /// Cannot make an offer on one's own listing
    SelfOffer = 4007,
    /// Buyer used up their offers on this listing
    OfferLimitReached = 4008,

    // ==================== 5xxx: Reservation ====================
    /// Reservation not found
    ReservationNotFound = 5001,
    /// Reservation is no longer active
    ReservationNotActive = 5002,
    /// Reservation has expired
    ReservationExpired = 5003,
    /// Listing already has a reservation
    ReservationConflict = 5004,
    /// Deposit must be captured before completion
    DepositRequired = 5005,
    /// Reserved amount does not match the accepted offer
    ReservationAmountMismatch = 5006,

    // ==================== 6xxx: Listing ====================
    /// Listing not found
    ListingNotFound = 6001,
    /// Listing is not available
    ListingNotAvailable = 6002,

    // ==================== 9xxx: System ====================
    /// Internal error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Stored state violates an engine invariant
    InconsistentState = 9003,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::NotOfferResponder => "Only the receiving party can respond to this offer",
            ErrorCode::NotOfferProposer => "Only the party who made this offer can withdraw it",
            ErrorCode::NotReservationParty => "Not a party to this reservation",

            // Offer
            ErrorCode::OfferNotFound => "Offer not found",
            ErrorCode::OfferNotPending => "Offer is no longer pending",
            ErrorCode::OfferExpired => "Offer has expired",
            ErrorCode::OfferInvalidAmount => "Offer amount must be greater than zero",
            ErrorCode::CounterExceedsPrice => "Counter-offer must be less than the listing price",
            ErrorCode::CurrencyMismatch => "Currency does not match the listing",
            ErrorCode::SelfOffer => "Cannot make an offer on your own listing",
            ErrorCode::OfferLimitReached => {
                "Maximum number of offers for this listing reached, contact the seller directly"
            }

            // Reservation
            ErrorCode::ReservationNotFound => "Reservation not found",
            ErrorCode::ReservationNotActive => "Reservation is not active",
            ErrorCode::ReservationExpired => "Reservation has expired",
            ErrorCode::ReservationConflict => "Listing is already reserved",
            ErrorCode::DepositRequired => "Deposit must be captured before completing",
            ErrorCode::ReservationAmountMismatch => {
                "Reserved amount does not match the accepted offer"
            }

            // Listing
            ErrorCode::ListingNotFound => "Listing not found",
            ErrorCode::ListingNotAvailable => "Listing is not available",

            // System
            ErrorCode::InternalError => "Internal error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::InconsistentState => "Stored state is inconsistent",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),

            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::NotOfferResponder),
            2003 => Ok(ErrorCode::NotOfferProposer),
            2004 => Ok(ErrorCode::NotReservationParty),

            4001 => Ok(ErrorCode::OfferNotFound),
            4002 => Ok(ErrorCode::OfferNotPending),
            4003 => Ok(ErrorCode::OfferExpired),
            4004 => Ok(ErrorCode::OfferInvalidAmount),
            4005 => Ok(ErrorCode::CounterExceedsPrice),
            4006 => Ok(ErrorCode::CurrencyMismatch),
            4007 => Ok(ErrorCode::SelfOffer),
            4008 => Ok(ErrorCode::OfferLimitReached),

            5001 => Ok(ErrorCode::ReservationNotFound),
            5002 => Ok(ErrorCode::ReservationNotActive),
            5003 => Ok(ErrorCode::ReservationExpired),
            5004 => Ok(ErrorCode::ReservationConflict),
            5005 => Ok(ErrorCode::DepositRequired),
            5006 => Ok(ErrorCode::ReservationAmountMismatch),

            6001 => Ok(ErrorCode::ListingNotFound),
            6002 => Ok(ErrorCode::ListingNotAvailable),

            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::InconsistentState),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[ErrorCode] = &[
        ErrorCode::Success,
        ErrorCode::Unknown,
        ErrorCode::ValidationFailed,
        ErrorCode::NotFound,
        ErrorCode::InvalidRequest,
        ErrorCode::PermissionDenied,
        ErrorCode::NotOfferResponder,
        ErrorCode::NotOfferProposer,
        ErrorCode::NotReservationParty,
        ErrorCode::OfferNotFound,
        ErrorCode::OfferNotPending,
        ErrorCode::OfferExpired,
        ErrorCode::OfferInvalidAmount,
        ErrorCode::CounterExceedsPrice,
        ErrorCode::CurrencyMismatch,
        ErrorCode::SelfOffer,
        ErrorCode::OfferLimitReached,
        ErrorCode::ReservationNotFound,
        ErrorCode::ReservationNotActive,
        ErrorCode::ReservationExpired,
        ErrorCode::ReservationConflict,
        ErrorCode::DepositRequired,
        ErrorCode::ReservationAmountMismatch,
        ErrorCode::ListingNotFound,
        ErrorCode::ListingNotAvailable,
        ErrorCode::InternalError,
        ErrorCode::DatabaseError,
        ErrorCode::InconsistentState,
        ErrorCode::ConfigError,
    ];

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::OfferNotPending.code(), 4002);
        assert_eq!(ErrorCode::ReservationConflict.code(), 5004);
        assert_eq!(ErrorCode::ListingNotAvailable.code(), 6002);
        assert_eq!(ErrorCode::InconsistentState.code(), 9003);
    }

    #[test]
    fn test_every_code_converts_back() {
        for code in ALL {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(*code));
            assert!(!code.message().is_empty());
        }
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(4999), Err(InvalidErrorCode(4999)));
        assert_eq!(
            InvalidErrorCode(4999).to_string(),
            "invalid error code: 4999"
        );
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::OfferExpired).unwrap();
        assert_eq!(json, "4003");
        let code: ErrorCode = serde_json::from_str("5005").unwrap();
        assert_eq!(code, ErrorCode::DepositRequired);
        assert!(serde_json::from_str::<ErrorCode>("12345").is_err());
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::OfferNotFound.is_success());
    }
}

//! Application error type

use super::category::ErrorCategory;
use super::codes::ErrorCode;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (conflicting expiry, offending field, ...)
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Look up a detail entry
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }

    /// Wrong status, wrong actor or bad input. Recoverable, never retried.
    pub fn is_precondition(&self) -> bool {
        !self.is_conflict()
            && !self.is_store_failure()
            && !matches!(self.code.category(), ErrorCategory::System)
    }

    /// Reservation collision; callers show the existing reservation.
    pub fn is_conflict(&self) -> bool {
        self.code == ErrorCode::ReservationConflict
    }

    /// Failure of the persistence layer; the scheduler retries on its next run.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::DatabaseError | ErrorCode::InternalError | ErrorCode::Unknown
        )
    }

    // ==================== Convenience constructors ====================

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PermissionDenied, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InconsistentState, msg)
    }

    /// Reservation conflict naming the expiry of the reservation in the way
    pub fn reservation_conflict(existing_expires_at: Option<i64>) -> Self {
        let err = Self::new(ErrorCode::ReservationConflict);
        match existing_expires_at {
            Some(at) => err
                .with_detail("existing_expires_at", at)
                .with_detail("existing_expires_at_rfc3339", crate::util::format_millis(at)),
            None => err,
        }
    }
}

/// Result type using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_new() {
        let err = AppError::new(ErrorCode::OfferNotPending);
        assert_eq!(err.code, ErrorCode::OfferNotPending);
        assert_eq!(err.message, "Offer is no longer pending");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::validation("Amount out of range")
            .with_detail("field", "amount")
            .with_detail("max", "100");

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.detail("field").unwrap(), "amount");
        assert_eq!(err.detail("max").unwrap(), "100");
        assert!(err.detail("min").is_none());
    }

    #[test]
    fn test_not_found_carries_resource() {
        let err = AppError::not_found("Listing 7");
        assert_eq!(err.message, "Listing 7 not found");
        assert_eq!(err.detail("resource").unwrap(), "Listing 7");
    }

    #[test]
    fn test_reservation_conflict_names_expiry() {
        let err = AppError::reservation_conflict(Some(0));
        assert!(err.is_conflict());
        assert!(!err.is_precondition());
        assert_eq!(err.detail("existing_expires_at").unwrap(), 0);
        assert_eq!(
            err.detail("existing_expires_at_rfc3339").unwrap(),
            "1970-01-01T00:00:00Z"
        );

        let err = AppError::reservation_conflict(None);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_error_taxonomy() {
        assert!(AppError::new(ErrorCode::OfferNotPending).is_precondition());
        assert!(AppError::new(ErrorCode::NotOfferResponder).is_precondition());
        assert!(AppError::new(ErrorCode::CounterExceedsPrice).is_precondition());
        assert!(AppError::database("disk full").is_store_failure());
        assert!(!AppError::database("disk full").is_precondition());
        assert!(!AppError::inconsistent("listing flip").is_precondition());
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::with_message(ErrorCode::OfferNotFound, "Offer 42 not found");
        assert_eq!(format!("{}", err), "Offer 42 not found");
    }
}

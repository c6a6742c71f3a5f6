//! Unified error system for the negotiation engine
//!
//! - [`ErrorCode`]: standardized numeric codes
//! - [`ErrorCategory`]: classification by code range
//! - [`AppError`]: code + message + optional structured details
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 2xxx: Permission errors
//! - 4xxx: Offer errors
//! - 5xxx: Reservation errors
//! - 6xxx: Listing errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::new(ErrorCode::OfferNotPending);
//! assert!(err.is_precondition());
//!
//! let err = AppError::validation("Amount must be positive")
//!     .with_detail("field", "amount");
//! assert_eq!(err.code, ErrorCode::ValidationFailed);
//! ```

mod category;
mod codes;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};

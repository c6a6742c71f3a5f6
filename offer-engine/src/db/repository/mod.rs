//! Repository Module
//!
//! One module per table. Every function runs exactly one statement against a
//! generic executor, so callers can pass `&pool` for a standalone read or
//! `&mut *tx` to take part in a unit of work. Status transitions are guarded
//! `UPDATE ... WHERE status = ?` statements that report rows affected; the
//! caller decides what zero rows means.

pub mod activity;
pub mod archive;
pub mod job_log;
pub mod listing;
pub mod notification;
pub mod offer;
pub mod reservation;

use rust_decimal::Decimal;
use shared::models::UnknownStatus;
use std::str::FromStr;
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A stored value that does not decode (bad decimal, unknown status)
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepoError::Duplicate(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound => RepoError::NotFound("row".into()),
            _ => RepoError::Database(err.to_string()),
        }
    }
}

impl From<UnknownStatus> for RepoError {
    fn from(err: UnknownStatus) -> Self {
        RepoError::Corrupt(err.to_string())
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

pub(crate) fn parse_decimal(field: &str, raw: &str) -> RepoResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| RepoError::Corrupt(format!("{field} = {raw:?}: {e}")))
}

pub(crate) fn parse_optional_decimal(field: &str, raw: Option<&str>) -> RepoResult<Option<Decimal>> {
    raw.map(|r| parse_decimal(field, r)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("amount", "80.50").unwrap(), Decimal::new(8050, 2));
        assert!(matches!(
            parse_decimal("amount", "eighty"),
            Err(RepoError::Corrupt(_))
        ));
        assert_eq!(parse_optional_decimal("sold_amount", None).unwrap(), None);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let err: RepoError = "held".parse::<shared::models::OfferStatus>().unwrap_err().into();
        assert!(matches!(err, RepoError::Corrupt(msg) if msg.contains("held")));
    }
}

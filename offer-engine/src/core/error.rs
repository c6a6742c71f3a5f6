//! Service-layer error
//!
//! `ServiceError` lets engine internals use `?` on both store errors and
//! business errors. Store errors are logged once here and surface to callers
//! as a generic failure.

use crate::db::repository::RepoError;
use shared::error::{AppError, ErrorCode};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum ServiceError {
    /// Database or infrastructure error
    Db(BoxError),
    /// Business-rule error, passed through to the caller
    App(AppError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Db(e.into())
    }
}

impl From<RepoError> for ServiceError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(what) => ServiceError::App(AppError::not_found(what)),
            RepoError::Duplicate(what) => ServiceError::App(AppError::with_message(
                ErrorCode::InvalidRequest,
                format!("{what} already exists"),
            )),
            other => ServiceError::Db(other.into()),
        }
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Engine store error");
                AppError::with_message(
                    ErrorCode::DatabaseError,
                    "The operation could not be completed, please try again",
                )
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_become_generic() {
        let err: AppError = ServiceError::from(RepoError::Database("disk I/O".into())).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("disk"));
    }

    #[test]
    fn test_business_errors_pass_through() {
        let err: AppError = ServiceError::from(AppError::new(ErrorCode::OfferExpired)).into();
        assert_eq!(err.code, ErrorCode::OfferExpired);
    }
}

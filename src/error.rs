use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use serde_json::json;
use thiserror::Error;

use crate::domain::settlement::NotificationError;
use crate::ports::RepositoryError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: BigDecimal,
        required: BigDecimal,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Store failures are transient; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Store(_))
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(what) => AppError::Validation(what),
            RepositoryError::Corrupt(what) => AppError::InvariantViolation(what),
            RepositoryError::Database(what) => AppError::Store(what),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("days must be between 1 and 365".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("payment ref inv-1".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_insufficient_balance_status_code() {
        let error = AppError::InsufficientBalance {
            available: BigDecimal::from(5),
            required: BigDecimal::from(10),
        };
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error.to_string().contains("available 5, required 10"));
    }

    #[test]
    fn test_store_error_is_retryable() {
        let error = AppError::from(RepositoryError::Database("connection reset".to_string()));
        assert!(error.is_retryable());
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_corrupt_row_is_invariant_violation() {
        let error = AppError::from(RepositoryError::Corrupt("unrecognized transaction kind 'JACKPOT'".to_string()));
        assert!(matches!(error, AppError::InvariantViolation(_)));
        assert!(!error.is_retryable());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_error_status_code() {
        let error = AppError::Unauthorized("bad signature".to_string());
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let error = AppError::Validation("Invalid date format".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_not_found_error_response() {
        let error = AppError::NotFound("Transaction not found".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;
use lending::LendingError;
use saga::{ErrorKind, SagaError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Borrow, return or reservation rejected by the coordinator.
    Saga(SagaError),
    /// Catalogue error from the inventory store.
    Inventory(InventoryError),
    /// User directory error.
    Lending(LendingError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Lending(err) => {
                tracing::error!(error = %err, "user directory error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
            }
        };

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, &'static str, String) {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyBorrowed
        | ErrorKind::NotAvailable
        | ErrorKind::AlreadyReturned
        | ErrorKind::DuplicateReservation => StatusCode::CONFLICT,
        ErrorKind::LimitExceeded => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::RemoteUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => {
            tracing::error!(error = %err, "saga storage error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, kind.as_str(), err.to_string())
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, &'static str, String) {
    match &err {
        InventoryError::BookNotFound(_) => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        InventoryError::InvalidCopies { .. } => {
            (StatusCode::BAD_REQUEST, "bad_request", err.to_string())
        }
        InventoryError::DuplicateBook(_) | InventoryError::IdempotencyConflict { .. } => {
            (StatusCode::CONFLICT, "conflict", err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "inventory store error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError::Lending(err)
    }
}

/// Failure while wiring the application state at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Inventory setup failed: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Lending setup failed: {0}")]
    Lending(#[from] LendingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BookId, UserId};

    #[test]
    fn saga_kinds_map_to_statuses() {
        let cases = [
            (
                SagaError::InvalidLoanPeriod("too long".into()),
                StatusCode::BAD_REQUEST,
            ),
            (SagaError::BookNotFound(BookId::new()), StatusCode::NOT_FOUND),
            (SagaError::NotAvailable(BookId::new()), StatusCode::CONFLICT),
            (
                SagaError::LimitExceeded {
                    user_id: UserId::new(),
                    limit: 3,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SagaError::RemoteUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }
}

//! Saga error types.

use common::{BookId, BorrowingId, UserId};
use inventory::InventoryError;
use lending::LendingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the borrowing coordinator and the availability client.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No user with this id exists.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// No book with this id exists.
    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    /// No borrowing with this id exists.
    #[error("Borrowing not found: {0}")]
    BorrowingNotFound(BorrowingId),

    /// The requested loan period is out of range.
    #[error("Invalid loan period: {0}")]
    InvalidLoanPeriod(String),

    /// The user already has this book out.
    #[error("User {user_id} already has book {book_id} borrowed")]
    AlreadyBorrowed { user_id: UserId, book_id: BookId },

    /// No copy was left when the decrement ran.
    #[error("Book {0} is not available")]
    NotAvailable(BookId),

    /// The user holds the maximum number of active borrowings.
    #[error("User {user_id} reached the borrowing limit of {limit}")]
    LimitExceeded { user_id: UserId, limit: u32 },

    /// The borrowing was already returned.
    #[error("Borrowing {0} was already returned")]
    AlreadyReturned(BorrowingId),

    /// The user already has an active reservation for this book.
    #[error("User {user_id} already has an active reservation for book {book_id}")]
    DuplicateReservation { user_id: UserId, book_id: BookId },

    /// The inventory service could not be reached in time.
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// The borrowing ledger failed.
    #[error("Ledger error: {0}")]
    Ledger(LendingError),

    /// The reservation queue failed.
    #[error("Reservation queue error: {0}")]
    Queue(LendingError),

    /// The inventory service rejected the call.
    #[error("Inventory error: {0}")]
    Inventory(InventoryError),
}

/// Closed classification of [`SagaError`], stable across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    AlreadyBorrowed,
    NotAvailable,
    LimitExceeded,
    AlreadyReturned,
    DuplicateReservation,
    RemoteUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyBorrowed => "already_borrowed",
            ErrorKind::NotAvailable => "not_available",
            ErrorKind::LimitExceeded => "limit_exceeded",
            ErrorKind::AlreadyReturned => "already_returned",
            ErrorKind::DuplicateReservation => "duplicate_reservation",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SagaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::InvalidLoanPeriod(_) => ErrorKind::InvalidRequest,
            SagaError::UserNotFound(_)
            | SagaError::BookNotFound(_)
            | SagaError::BorrowingNotFound(_) => ErrorKind::NotFound,
            SagaError::AlreadyBorrowed { .. } => ErrorKind::AlreadyBorrowed,
            SagaError::NotAvailable(_) => ErrorKind::NotAvailable,
            SagaError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            SagaError::AlreadyReturned(_) => ErrorKind::AlreadyReturned,
            SagaError::DuplicateReservation { .. } => ErrorKind::DuplicateReservation,
            SagaError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            SagaError::Ledger(_) | SagaError::Queue(_) | SagaError::Inventory(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// True for failures a retry with the same idempotency key may cure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SagaError::RemoteUnavailable(_))
    }

    /// Maps a ledger error, keeping the business rejections distinct.
    pub(crate) fn from_ledger(err: LendingError) -> Self {
        match err {
            LendingError::BorrowingNotFound(id) => SagaError::BorrowingNotFound(id),
            LendingError::AlreadyReturned(id) => SagaError::AlreadyReturned(id),
            LendingError::AlreadyBorrowed { user_id, book_id } => {
                SagaError::AlreadyBorrowed { user_id, book_id }
            }
            LendingError::LimitExceeded { user_id, limit } => {
                SagaError::LimitExceeded { user_id, limit }
            }
            other => SagaError::Ledger(other),
        }
    }

    pub(crate) fn from_queue(err: LendingError) -> Self {
        match err {
            LendingError::DuplicateReservation { user_id, book_id } => {
                SagaError::DuplicateReservation { user_id, book_id }
            }
            other => SagaError::Queue(other),
        }
    }
}

impl From<InventoryError> for SagaError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::BookNotFound(id) => SagaError::BookNotFound(id),
            other => SagaError::Inventory(other),
        }
    }
}

/// Errors from the cache layer. Never surfaced to callers of the
/// coordinator; a failing cache degrades to a direct read.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_share_a_kind() {
        assert_eq!(SagaError::UserNotFound(UserId::new()).kind(), ErrorKind::NotFound);
        assert_eq!(SagaError::BookNotFound(BookId::new()).kind(), ErrorKind::NotFound);
        assert_eq!(
            SagaError::BorrowingNotFound(BorrowingId::new()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn ledger_rejections_keep_their_kind() {
        let user_id = UserId::new();
        let err = SagaError::from_ledger(LendingError::LimitExceeded { user_id, limit: 3 });
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);

        let err = SagaError::from_ledger(LendingError::Storage("disk".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn only_remote_failures_are_retryable() {
        assert!(SagaError::RemoteUnavailable("timeout".into()).is_retryable());
        assert!(!SagaError::NotAvailable(BookId::new()).is_retryable());
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::DuplicateReservation).unwrap(),
            "duplicate_reservation"
        );
        assert_eq!(ErrorKind::RemoteUnavailable.to_string(), "remote_unavailable");
    }
}

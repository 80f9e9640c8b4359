//! Lending error types.

use thiserror::Error;

use crate::{BookId, BorrowingId, UserId};

/// Errors raised by the ledger and the reservation queue.
#[derive(Debug, Error)]
pub enum LendingError {
    /// No borrowing with this id exists.
    #[error("Borrowing not found: {0}")]
    BorrowingNotFound(BorrowingId),

    /// The borrowing was already returned.
    #[error("Borrowing {0} was already returned")]
    AlreadyReturned(BorrowingId),

    /// The user already holds a non-returned borrowing of this book.
    #[error("User {user_id} already has book {book_id} borrowed")]
    AlreadyBorrowed { user_id: UserId, book_id: BookId },

    /// The user holds as many active borrowings as allowed.
    #[error("User {user_id} reached the borrowing limit of {limit}")]
    LimitExceeded { user_id: UserId, limit: u32 },

    /// The user already holds an active reservation of this book.
    #[error("User {user_id} already has an active reservation for book {book_id}")]
    DuplicateReservation { user_id: UserId, book_id: BookId },

    /// The store rejected or could not complete the operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored row could not be mapped back to a record.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for lending operations.
pub type Result<T> = std::result::Result<T, LendingError>;

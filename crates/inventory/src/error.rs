use thiserror::Error;

use crate::{BookId, IdempotencyKey};

/// Errors that can occur when interacting with the availability store.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The book does not exist in the catalogue.
    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    /// A book was registered with counts that break `0 <= available <= total`.
    #[error("Invalid copy counts: {available} available out of {total}")]
    InvalidCopies { total: u32, available: u32 },

    /// The book is already registered.
    #[error("Book already exists: {0}")]
    DuplicateBook(BookId),

    /// An idempotency key was replayed for a different book or operation.
    #[error("Idempotency key {key} was already used for a different mutation on book {book_id}")]
    IdempotencyConflict {
        key: IdempotencyKey,
        book_id: BookId,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for availability store operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

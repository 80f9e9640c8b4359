use async_trait::async_trait;

use crate::{Book, BookId, IdempotencyKey, InventoryError, Result};

/// Result of a conditional decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// One copy was taken; carries the count left on the shelf.
    Decremented { available_copies: u32 },
    /// The guard `available_copies > 0` did not hold.
    NotAvailable,
}

impl DecrementOutcome {
    pub fn is_decremented(&self) -> bool {
        matches!(self, DecrementOutcome::Decremented { .. })
    }
}

/// Outcome recorded against an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Decremented(u32),
    NotAvailable,
    Incremented(u32),
}

impl MutationOutcome {
    /// Storage tag used by persistent stores.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationOutcome::Decremented(_) => "decremented",
            MutationOutcome::NotAvailable => "not_available",
            MutationOutcome::Incremented(_) => "incremented",
        }
    }

    /// Count left after the mutation, if it changed anything.
    pub fn available_after(&self) -> Option<u32> {
        match self {
            MutationOutcome::Decremented(n) | MutationOutcome::Incremented(n) => Some(*n),
            MutationOutcome::NotAvailable => None,
        }
    }

    /// Rebuilds an outcome from its storage tag.
    pub fn from_parts(kind: &str, available_after: Option<u32>) -> Option<Self> {
        match (kind, available_after) {
            ("decremented", Some(n)) => Some(MutationOutcome::Decremented(n)),
            ("not_available", _) => Some(MutationOutcome::NotAvailable),
            ("incremented", Some(n)) => Some(MutationOutcome::Incremented(n)),
            _ => None,
        }
    }

    /// Interprets a recorded outcome as the answer to a replayed decrement.
    pub(crate) fn as_decrement(
        self,
        key: &IdempotencyKey,
        book_id: BookId,
    ) -> Result<DecrementOutcome> {
        match self {
            MutationOutcome::Decremented(n) => Ok(DecrementOutcome::Decremented {
                available_copies: n,
            }),
            MutationOutcome::NotAvailable => Ok(DecrementOutcome::NotAvailable),
            MutationOutcome::Incremented(_) => Err(InventoryError::IdempotencyConflict {
                key: key.clone(),
                book_id,
            }),
        }
    }

    /// Interprets a recorded outcome as the answer to a replayed increment.
    pub(crate) fn as_increment(self, key: &IdempotencyKey, book_id: BookId) -> Result<u32> {
        match self {
            MutationOutcome::Incremented(n) => Ok(n),
            _ => Err(InventoryError::IdempotencyConflict {
                key: key.clone(),
                book_id,
            }),
        }
    }
}

/// Core trait for availability store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and must implement
/// the two mutations as single atomic operations: no caller may observe or
/// act on a count between a read and a write.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Registers a book in the catalogue.
    async fn add_book(&self, book: Book) -> Result<()>;

    /// Loads a book, or `None` if it is not catalogued.
    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>>;

    /// Lists books, optionally restricted to one category, ordered by title.
    async fn list_books(&self, category: Option<&str>) -> Result<Vec<Book>>;

    /// Returns the current available count.
    ///
    /// Advisory only: the count may change before the caller acts on it.
    async fn check_available(&self, book_id: BookId) -> Result<u32>;

    /// Takes one copy if and only if `available_copies > 0`.
    ///
    /// Replaying a key returns the outcome recorded the first time.
    async fn try_decrement(
        &self,
        book_id: BookId,
        key: &IdempotencyKey,
    ) -> Result<DecrementOutcome>;

    /// Puts one copy back, saturating at `total_copies`.
    ///
    /// Returns the count after the increment. Replaying a key returns the
    /// recorded count without incrementing again.
    async fn increment(&self, book_id: BookId, key: &IdempotencyKey) -> Result<u32>;
}

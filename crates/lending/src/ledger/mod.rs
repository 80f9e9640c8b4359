//! Borrowing ledger: the borrowing service's record of loans.

mod memory;
mod postgres;

pub use memory::InMemoryBorrowingLedger;
pub use postgres::PostgresBorrowingLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{BookId, Borrowing, BorrowingId, Money, Result, UserId};

/// Borrowing counts across all users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Every record, returned or not.
    pub total: u64,
    pub active: u64,
    /// Active and past due.
    pub overdue: u64,
}

/// Storage of borrowing records.
///
/// `insert` and `mark_returned` are conditional writes: each re-checks its
/// guard in the same atomic step that writes, so concurrent requests cannot
/// both pass a check made earlier by the caller.
#[async_trait]
pub trait BorrowingLedger: Send + Sync {
    /// Inserts an active borrowing.
    ///
    /// Fails with `AlreadyBorrowed` if the user already has this book out
    /// and with `LimitExceeded` if the user already holds `limit` active
    /// borrowings.
    async fn insert(&self, borrowing: Borrowing, limit: u32) -> Result<()>;

    async fn get(&self, id: BorrowingId) -> Result<Option<Borrowing>>;

    /// The user's non-returned borrowing of this book, if any.
    async fn find_active(&self, user_id: UserId, book_id: BookId) -> Result<Option<Borrowing>>;

    /// Number of non-returned borrowings held by the user.
    async fn count_active(&self, user_id: UserId) -> Result<u32>;

    /// Non-returned borrowings held by the user, oldest first.
    async fn active_for_user(&self, user_id: UserId) -> Result<Vec<Borrowing>>;

    /// Non-returned borrowings past their due date as of `now`, most overdue first.
    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Borrowing>>;

    /// Record counts as of `now`.
    async fn stats(&self, now: DateTime<Utc>) -> Result<LedgerStats>;

    /// Marks the borrowing returned with the given fine.
    ///
    /// Fails with `AlreadyReturned` without touching the stored fine or
    /// return time if the borrowing is already closed.
    async fn mark_returned(
        &self,
        id: BorrowingId,
        returned_at: DateTime<Utc>,
        fine_amount: Money,
    ) -> Result<Borrowing>;
}

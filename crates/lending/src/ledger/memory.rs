use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{BorrowingLedger, LedgerStats};
use crate::{BookId, Borrowing, BorrowingId, LendingError, Money, Result, UserId};

/// In-memory borrowing ledger.
///
/// Conditional writes run under one write lock, so the guard and the write
/// are a single step.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBorrowingLedger {
    borrowings: Arc<RwLock<HashMap<BorrowingId, Borrowing>>>,
    fail_on_insert: Arc<AtomicBool>,
}

impl InMemoryBorrowingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following insert fail with a storage error.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Total number of records, returned or not.
    pub async fn len(&self) -> usize {
        self.borrowings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.borrowings.read().await.is_empty()
    }
}

#[async_trait]
impl BorrowingLedger for InMemoryBorrowingLedger {
    #[tracing::instrument(skip(self, borrowing), fields(borrowing_id = %borrowing.id))]
    async fn insert(&self, borrowing: Borrowing, limit: u32) -> Result<()> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(LendingError::Storage("ledger unavailable".to_string()));
        }

        let mut borrowings = self.borrowings.write().await;

        let held: Vec<&Borrowing> = borrowings
            .values()
            .filter(|b| b.user_id == borrowing.user_id && b.is_active())
            .collect();

        if held.iter().any(|b| b.book_id == borrowing.book_id) {
            return Err(LendingError::AlreadyBorrowed {
                user_id: borrowing.user_id,
                book_id: borrowing.book_id,
            });
        }
        if held.len() >= limit as usize {
            return Err(LendingError::LimitExceeded {
                user_id: borrowing.user_id,
                limit,
            });
        }

        borrowings.insert(borrowing.id, borrowing);
        Ok(())
    }

    async fn get(&self, id: BorrowingId) -> Result<Option<Borrowing>> {
        Ok(self.borrowings.read().await.get(&id).cloned())
    }

    async fn find_active(&self, user_id: UserId, book_id: BookId) -> Result<Option<Borrowing>> {
        Ok(self
            .borrowings
            .read()
            .await
            .values()
            .find(|b| b.user_id == user_id && b.book_id == book_id && b.is_active())
            .cloned())
    }

    async fn count_active(&self, user_id: UserId) -> Result<u32> {
        let count = self
            .borrowings
            .read()
            .await
            .values()
            .filter(|b| b.user_id == user_id && b.is_active())
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn active_for_user(&self, user_id: UserId) -> Result<Vec<Borrowing>> {
        let mut active: Vec<_> = self
            .borrowings
            .read()
            .await
            .values()
            .filter(|b| b.user_id == user_id && b.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|b| b.borrowed_at);
        Ok(active)
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Borrowing>> {
        let mut overdue: Vec<_> = self
            .borrowings
            .read()
            .await
            .values()
            .filter(|b| b.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|b| b.due_at);
        Ok(overdue)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<LedgerStats> {
        let borrowings = self.borrowings.read().await;
        let mut stats = LedgerStats {
            total: borrowings.len() as u64,
            ..LedgerStats::default()
        };
        for b in borrowings.values().filter(|b| b.is_active()) {
            stats.active += 1;
            if b.is_overdue(now) {
                stats.overdue += 1;
            }
        }
        Ok(stats)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_returned(
        &self,
        id: BorrowingId,
        returned_at: DateTime<Utc>,
        fine_amount: Money,
    ) -> Result<Borrowing> {
        let mut borrowings = self.borrowings.write().await;
        let borrowing = borrowings
            .get_mut(&id)
            .ok_or(LendingError::BorrowingNotFound(id))?;
        borrowing.close(returned_at, fine_amount)?;
        Ok(borrowing.clone())
    }
}

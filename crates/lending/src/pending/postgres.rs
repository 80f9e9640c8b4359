use async_trait::async_trait;
use common::IdempotencyKey;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{PendingIncrement, PendingIncrementStore};
use crate::{BookId, LendingError, Result};

/// Pending increments kept in the lending schema, so they survive a restart
/// of the borrowing service.
///
/// The table is created by the lending migrations
/// (`PostgresBorrowingLedger::run_migrations`).
#[derive(Clone)]
pub struct PostgresPendingIncrements {
    pool: PgPool,
}

impl PostgresPendingIncrements {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_pending(row: PgRow) -> Result<PendingIncrement> {
        let attempts: i32 = row.try_get("attempts")?;
        let unresolved: Option<String> = row.try_get("unresolved_decrement")?;
        Ok(PendingIncrement {
            key: IdempotencyKey::new(row.try_get::<String, _>("key")?),
            book_id: BookId::from_uuid(row.try_get::<Uuid, _>("book_id")?),
            queued_at: row.try_get("queued_at")?,
            attempts: u32::try_from(attempts)
                .map_err(|_| LendingError::CorruptRecord(format!("pending attempts {attempts}")))?,
            unresolved_decrement: unresolved.map(IdempotencyKey::new),
        })
    }
}

#[async_trait]
impl PendingIncrementStore for PostgresPendingIncrements {
    #[tracing::instrument(skip(self, pending), fields(key = %pending.key))]
    async fn push(&self, pending: PendingIncrement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_increments (key, book_id, queued_at, attempts, unresolved_decrement)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(pending.key.as_str())
        .bind(pending.book_id.as_uuid())
        .bind(pending.queued_at)
        .bind(i32::try_from(pending.attempts).unwrap_or(i32::MAX))
        .bind(pending.unresolved_decrement.as_ref().map(IdempotencyKey::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingIncrement>> {
        let rows = sqlx::query(
            r#"
            SELECT key, book_id, queued_at, attempts, unresolved_decrement
            FROM pending_increments
            ORDER BY queued_at ASC, key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_pending).collect()
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_increments")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn remove(&self, key: &IdempotencyKey) -> Result<()> {
        sqlx::query("DELETE FROM pending_increments WHERE key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, key: &IdempotencyKey) -> Result<()> {
        sqlx::query("UPDATE pending_increments SET attempts = attempts + 1 WHERE key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

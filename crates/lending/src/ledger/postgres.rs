use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{BorrowingLedger, LedgerStats};
use crate::{BookId, Borrowing, BorrowingId, LendingError, Money, Result, UserId};

const BORROWING_COLUMNS: &str =
    "id, user_id, book_id, borrowed_at, due_at, returned_at, returned, fine_cents";

/// PostgreSQL-backed borrowing ledger.
#[derive(Clone)]
pub struct PostgresBorrowingLedger {
    pool: PgPool,
}

impl PostgresBorrowingLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the lending schema migrations (borrowings and reservations).
    pub async fn run_migrations(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("../../migrations/lending");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }

    fn row_to_borrowing(row: PgRow) -> Result<Borrowing> {
        Borrowing {
            id: BorrowingId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            book_id: BookId::from_uuid(row.try_get::<Uuid, _>("book_id")?),
            borrowed_at: row.try_get("borrowed_at")?,
            due_at: row.try_get("due_at")?,
            returned_at: row.try_get("returned_at")?,
            returned: row.try_get("returned")?,
            fine_amount: Money::from_cents(row.try_get("fine_cents")?),
        }
        .checked()
    }
}

#[async_trait]
impl BorrowingLedger for PostgresBorrowingLedger {
    #[tracing::instrument(skip(self, borrowing), fields(borrowing_id = %borrowing.id))]
    async fn insert(&self, borrowing: Borrowing, limit: u32) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Serializes limit checks per user; the partial unique index on
        // (user_id, book_id) backs up the duplicate check.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("borrowings:{}", borrowing.user_id))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS active,
                   COUNT(*) FILTER (WHERE book_id = $2) AS same_book
            FROM borrowings
            WHERE user_id = $1 AND NOT returned
            "#,
        )
        .bind(borrowing.user_id.as_uuid())
        .bind(borrowing.book_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let active: i64 = row.try_get("active")?;
        let same_book: i64 = row.try_get("same_book")?;

        if same_book > 0 {
            return Err(LendingError::AlreadyBorrowed {
                user_id: borrowing.user_id,
                book_id: borrowing.book_id,
            });
        }
        if active >= i64::from(limit) {
            return Err(LendingError::LimitExceeded {
                user_id: borrowing.user_id,
                limit,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO borrowings (id, user_id, book_id, borrowed_at, due_at, returned_at, returned, fine_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(borrowing.id.as_uuid())
        .bind(borrowing.user_id.as_uuid())
        .bind(borrowing.book_id.as_uuid())
        .bind(borrowing.borrowed_at)
        .bind(borrowing.due_at)
        .bind(borrowing.returned_at)
        .bind(borrowing.returned)
        .bind(borrowing.fine_amount.cents())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("one_active_borrowing_per_book")
            {
                return LendingError::AlreadyBorrowed {
                    user_id: borrowing.user_id,
                    book_id: borrowing.book_id,
                };
            }
            LendingError::Database(e)
        })?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: BorrowingId) -> Result<Option<Borrowing>> {
        let row = sqlx::query(&format!(
            "SELECT {BORROWING_COLUMNS} FROM borrowings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_borrowing).transpose()
    }

    async fn find_active(&self, user_id: UserId, book_id: BookId) -> Result<Option<Borrowing>> {
        let row = sqlx::query(&format!(
            "SELECT {BORROWING_COLUMNS} FROM borrowings WHERE user_id = $1 AND book_id = $2 AND NOT returned"
        ))
        .bind(user_id.as_uuid())
        .bind(book_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_borrowing).transpose()
    }

    async fn count_active(&self, user_id: UserId) -> Result<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND NOT returned")
                .bind(user_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn active_for_user(&self, user_id: UserId) -> Result<Vec<Borrowing>> {
        let rows = sqlx::query(&format!(
            "SELECT {BORROWING_COLUMNS} FROM borrowings WHERE user_id = $1 AND NOT returned ORDER BY borrowed_at ASC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_borrowing).collect()
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Borrowing>> {
        let rows = sqlx::query(&format!(
            "SELECT {BORROWING_COLUMNS} FROM borrowings WHERE NOT returned AND due_at < $1 ORDER BY due_at ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_borrowing).collect()
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<LedgerStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE NOT returned) AS active,
                   COUNT(*) FILTER (WHERE NOT returned AND due_at < $1) AS overdue
            FROM borrowings
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u64> {
            let n: i64 = row.try_get(column)?;
            u64::try_from(n).map_err(|_| LendingError::CorruptRecord(format!("{column} = {n}")))
        };
        Ok(LedgerStats {
            total: count("total")?,
            active: count("active")?,
            overdue: count("overdue")?,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn mark_returned(
        &self,
        id: BorrowingId,
        returned_at: DateTime<Utc>,
        fine_amount: Money,
    ) -> Result<Borrowing> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE borrowings
            SET returned = TRUE, returned_at = $2, fine_cents = $3
            WHERE id = $1 AND NOT returned
            RETURNING {BORROWING_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(returned_at)
        .bind(fine_amount.cents())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_borrowing(row),
            None => match self.get(id).await? {
                Some(_) => Err(LendingError::AlreadyReturned(id)),
                None => Err(LendingError::BorrowingNotFound(id)),
            },
        }
    }
}

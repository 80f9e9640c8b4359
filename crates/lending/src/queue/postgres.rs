use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::ReservationQueue;
use crate::{
    BookId, LendingError, Reservation, ReservationId, ReservationStatus, Result, UserId,
};

const RESERVATION_COLUMNS: &str = "id, user_id, book_id, reserved_at, status, priority, notified";

/// PostgreSQL-backed reservation queue.
///
/// Priority assignment takes a transaction-scoped advisory lock keyed on the
/// book id. Migrations are shared with [`crate::PostgresBorrowingLedger`].
#[derive(Clone)]
pub struct PostgresReservationQueue {
    pool: PgPool,
}

impl PostgresReservationQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        let status = ReservationStatus::parse(&status)
            .ok_or_else(|| LendingError::CorruptRecord(format!("reservation status {status}")))?;
        let priority: i32 = row.try_get("priority")?;
        let priority = u32::try_from(priority)
            .map_err(|_| LendingError::CorruptRecord(format!("reservation priority {priority}")))?;

        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            book_id: BookId::from_uuid(row.try_get::<Uuid, _>("book_id")?),
            reserved_at: row.try_get("reserved_at")?,
            status,
            priority,
            notified: row.try_get("notified")?,
        })
    }
}

#[async_trait]
impl ReservationQueue for PostgresReservationQueue {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        user_id: UserId,
        book_id: BookId,
        reserved_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("reservations:{book_id}"))
            .execute(&mut *tx)
            .await?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE user_id = $1 AND book_id = $2 AND status = 'active'",
        )
        .bind(user_id.as_uuid())
        .bind(book_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        if existing > 0 {
            return Err(LendingError::DuplicateReservation { user_id, book_id });
        }

        let max_priority: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(priority), 0) FROM reservations WHERE book_id = $1 AND status = 'active'",
        )
        .bind(book_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let priority = u32::try_from(max_priority + 1)
            .map_err(|_| LendingError::CorruptRecord(format!("reservation priority {max_priority}")))?;
        let reservation = Reservation::new(user_id, book_id, reserved_at, priority);

        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, book_id, reserved_at, status, priority, notified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.user_id.as_uuid())
        .bind(reservation.book_id.as_uuid())
        .bind(reservation.reserved_at)
        .bind(reservation.status.as_str())
        .bind(max_priority + 1)
        .bind(reservation.notified)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reservation)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn active_for_book(&self, book_id: BookId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE book_id = $1 AND status = 'active' ORDER BY priority ASC"
        ))
        .bind(book_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn count_active(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE status = 'active'")
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[tracing::instrument(skip(self))]
    async fn notify_next(&self, book_id: BookId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET notified = TRUE
            WHERE id = (
                SELECT id FROM reservations
                WHERE book_id = $1 AND status = 'active' AND NOT notified
                ORDER BY priority ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(book_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }
}

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Book, BookId, IdempotencyKey, InventoryError, Result,
    store::{AvailabilityStore, DecrementOutcome, MutationOutcome},
};

/// PostgreSQL-backed availability store.
///
/// The decrement is a single guarded `UPDATE ... WHERE available_copies > 0`;
/// the database serializes concurrent updates of the same row, so two
/// borrowers can never both take the last copy.
#[derive(Clone)]
pub struct PostgresAvailabilityStore {
    pool: PgPool,
}

fn to_db(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn from_db(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

impl PostgresAvailabilityStore {
    /// Creates a new PostgreSQL availability store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the inventory schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        // The services may share one database; each migrator skips the
        // versions owned by the others.
        let mut migrator = sqlx::migrate!("../../migrations/inventory");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }

    fn row_to_book(row: PgRow) -> Result<Book> {
        Ok(Book {
            id: BookId::from_uuid(row.try_get::<Uuid, _>("id")?),
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            isbn: row.try_get("isbn")?,
            category: row.try_get("category")?,
            description: row.try_get("description")?,
            total_copies: from_db(row.try_get("total_copies")?),
            available_copies: from_db(row.try_get("available_copies")?),
        })
    }

    /// Serializes all mutations carrying the same key and returns the
    /// outcome recorded for it, if any.
    async fn lock_and_replay(
        tx: &mut Transaction<'_, Postgres>,
        key: &IdempotencyKey,
        book_id: BookId,
    ) -> Result<Option<MutationOutcome>> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key.as_str())
            .execute(&mut **tx)
            .await?;

        let row = sqlx::query(
            "SELECT book_id, outcome, available_after FROM availability_mutations WHERE key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let recorded_book: Uuid = row.try_get("book_id")?;
        let kind: String = row.try_get("outcome")?;
        let available_after: Option<i32> = row.try_get("available_after")?;

        match MutationOutcome::from_parts(&kind, available_after.map(from_db)) {
            Some(outcome) if recorded_book == book_id.as_uuid() => Ok(Some(outcome)),
            _ => Err(InventoryError::IdempotencyConflict {
                key: key.clone(),
                book_id,
            }),
        }
    }

    async fn record(
        tx: &mut Transaction<'_, Postgres>,
        key: &IdempotencyKey,
        book_id: BookId,
        outcome: MutationOutcome,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO availability_mutations (key, book_id, outcome, available_after)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(key.as_str())
        .bind(book_id.as_uuid())
        .bind(outcome.kind())
        .bind(outcome.available_after().map(to_db))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn book_exists(tx: &mut Transaction<'_, Postgres>, book_id: BookId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(book_id.as_uuid())
            .fetch_one(&mut **tx)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl AvailabilityStore for PostgresAvailabilityStore {
    async fn add_book(&self, book: Book) -> Result<()> {
        book.validate()?;

        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, isbn, category, description, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.description)
        .bind(to_db(book.total_copies))
        .bind(to_db(book.available_copies))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("books_pkey")
            {
                return InventoryError::DuplicateBook(book.id);
            }
            InventoryError::Database(e)
        })?;

        Ok(())
    }

    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, author, isbn, category, description, total_copies, available_copies
            FROM books
            WHERE id = $1
            "#,
        )
        .bind(book_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_book).transpose()
    }

    async fn list_books(&self, category: Option<&str>) -> Result<Vec<Book>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, author, isbn, category, description, total_copies, available_copies
            FROM books
            WHERE $1::TEXT IS NULL OR category = $1
            ORDER BY title ASC
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_book).collect()
    }

    async fn check_available(&self, book_id: BookId) -> Result<u32> {
        let available: Option<i32> =
            sqlx::query_scalar("SELECT available_copies FROM books WHERE id = $1")
                .bind(book_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        available
            .map(from_db)
            .ok_or(InventoryError::BookNotFound(book_id))
    }

    #[tracing::instrument(skip(self))]
    async fn try_decrement(
        &self,
        book_id: BookId,
        key: &IdempotencyKey,
    ) -> Result<DecrementOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(outcome) = Self::lock_and_replay(&mut tx, key, book_id).await? {
            tx.commit().await?;
            tracing::debug!(%key, "replayed decrement");
            return outcome.as_decrement(key, book_id);
        }

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1
            WHERE id = $1 AND available_copies > 0
            RETURNING available_copies
            "#,
        )
        .bind(book_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match remaining {
            Some(count) => MutationOutcome::Decremented(from_db(count)),
            None if Self::book_exists(&mut tx, book_id).await? => MutationOutcome::NotAvailable,
            None => return Err(InventoryError::BookNotFound(book_id)),
        };

        Self::record(&mut tx, key, book_id, outcome).await?;
        tx.commit().await?;

        outcome.as_decrement(key, book_id)
    }

    #[tracing::instrument(skip(self))]
    async fn increment(&self, book_id: BookId, key: &IdempotencyKey) -> Result<u32> {
        let mut tx = self.pool.begin().await?;

        if let Some(outcome) = Self::lock_and_replay(&mut tx, key, book_id).await? {
            tx.commit().await?;
            tracing::debug!(%key, "replayed increment");
            return outcome.as_increment(key, book_id);
        }

        let available: i32 = sqlx::query_scalar(
            r#"
            UPDATE books
            SET available_copies = LEAST(available_copies + 1, total_copies)
            WHERE id = $1
            RETURNING available_copies
            "#,
        )
        .bind(book_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(InventoryError::BookNotFound(book_id))?;

        let available = from_db(available);
        Self::record(&mut tx, key, book_id, MutationOutcome::Incremented(available)).await?;
        tx.commit().await?;

        Ok(available)
    }
}

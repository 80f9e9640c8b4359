//! Per-book reservation queues.

mod memory;
mod postgres;

pub use memory::InMemoryReservationQueue;
pub use postgres::PostgresReservationQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{BookId, Reservation, ReservationId, Result, UserId};

/// Storage of reservations, ordered by priority within each book.
///
/// Priority assignment is a read of the current maximum followed by an
/// insert; implementations serialize that pair per book so that concurrent
/// reservations for one book get distinct, consecutive priorities while
/// other books proceed independently.
#[async_trait]
pub trait ReservationQueue: Send + Sync {
    /// Appends a reservation at `max active priority + 1`.
    ///
    /// Fails with `DuplicateReservation` if the user already holds an
    /// active reservation for the book.
    async fn reserve(
        &self,
        user_id: UserId,
        book_id: BookId,
        reserved_at: DateTime<Utc>,
    ) -> Result<Reservation>;

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Active reservations for the book, lowest priority number first.
    async fn active_for_book(&self, book_id: BookId) -> Result<Vec<Reservation>>;

    /// Number of active reservations across all books.
    async fn count_active(&self) -> Result<u64>;

    /// Flags the first active, not yet notified reservation for the book.
    ///
    /// Status and priority are left as they are. Returns `None` when nobody
    /// is waiting.
    async fn notify_next(&self, book_id: BookId) -> Result<Option<Reservation>>;
}

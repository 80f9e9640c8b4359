use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::ReservationQueue;
use crate::{BookId, LendingError, Reservation, ReservationId, Result, UserId};

type BookQueue = Arc<Mutex<Vec<Reservation>>>;

/// In-memory reservation queue.
///
/// Each book owns its own mutex, so priority assignment is serialized per
/// book and never across books.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationQueue {
    queues: Arc<RwLock<HashMap<BookId, BookQueue>>>,
}

impl InMemoryReservationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn queue_for(&self, book_id: BookId) -> BookQueue {
        if let Some(queue) = self.queues.read().await.get(&book_id) {
            return queue.clone();
        }
        self.queues
            .write()
            .await
            .entry(book_id)
            .or_default()
            .clone()
    }
}

#[async_trait]
impl ReservationQueue for InMemoryReservationQueue {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        user_id: UserId,
        book_id: BookId,
        reserved_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let queue = self.queue_for(book_id).await;
        let mut reservations = queue.lock().await;

        let active = reservations.iter().filter(|r| r.is_active());
        let mut max_priority = 0;
        for r in active {
            if r.user_id == user_id {
                return Err(LendingError::DuplicateReservation { user_id, book_id });
            }
            max_priority = max_priority.max(r.priority);
        }

        let reservation = Reservation::new(user_id, book_id, reserved_at, max_priority + 1);
        reservations.push(reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let queues: Vec<BookQueue> = self.queues.read().await.values().cloned().collect();
        for queue in queues {
            if let Some(r) = queue.lock().await.iter().find(|r| r.id == id) {
                return Ok(Some(r.clone()));
            }
        }
        Ok(None)
    }

    async fn active_for_book(&self, book_id: BookId) -> Result<Vec<Reservation>> {
        let Some(queue) = self.queues.read().await.get(&book_id).cloned() else {
            return Ok(Vec::new());
        };
        let mut active: Vec<_> = queue
            .lock()
            .await
            .iter()
            .filter(|r| r.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|r| r.priority);
        Ok(active)
    }

    async fn count_active(&self) -> Result<u64> {
        let queues: Vec<BookQueue> = self.queues.read().await.values().cloned().collect();
        let mut count = 0;
        for queue in queues {
            count += queue.lock().await.iter().filter(|r| r.is_active()).count() as u64;
        }
        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn notify_next(&self, book_id: BookId) -> Result<Option<Reservation>> {
        let Some(queue) = self.queues.read().await.get(&book_id).cloned() else {
            return Ok(None);
        };
        let mut reservations = queue.lock().await;
        let next = reservations
            .iter_mut()
            .filter(|r| r.is_active() && !r.notified)
            .min_by_key(|r| r.priority);

        Ok(next.map(|r| {
            r.notified = true;
            r.clone()
        }))
    }
}

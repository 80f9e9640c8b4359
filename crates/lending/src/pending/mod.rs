//! Increments owed to the inventory service.
//!
//! A return commits before its increment reaches the inventory service, and
//! a borrow compensation can fail after the ledger rejected the insert.
//! Either way the copy count is one short until the increment lands, so the
//! increment is recorded here and replayed later with its original key.

mod memory;
mod postgres;

pub use memory::InMemoryPendingIncrements;
pub use postgres::PostgresPendingIncrements;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::IdempotencyKey;
use serde::Serialize;

use crate::{BookId, Result};

/// An increment the inventory service has not acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingIncrement {
    pub key: IdempotencyKey,
    pub book_id: BookId,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    /// Decrement whose outcome is unknown and must be resolved first.
    pub unresolved_decrement: Option<IdempotencyKey>,
}

impl PendingIncrement {
    pub fn new(key: IdempotencyKey, book_id: BookId, queued_at: DateTime<Utc>) -> Self {
        Self {
            key,
            book_id,
            queued_at,
            attempts: 1,
            unresolved_decrement: None,
        }
    }

    /// Undo of a decrement that may or may not have been applied.
    pub fn undo_decrement(
        decrement_key: IdempotencyKey,
        key: IdempotencyKey,
        book_id: BookId,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            unresolved_decrement: Some(decrement_key),
            ..Self::new(key, book_id, queued_at)
        }
    }
}

/// Storage of pending increments, keyed by idempotency key.
#[async_trait]
pub trait PendingIncrementStore: Send + Sync {
    /// Queues an increment. A key already queued is left untouched.
    async fn push(&self, pending: PendingIncrement) -> Result<()>;

    /// Every queued increment, oldest first.
    async fn list(&self) -> Result<Vec<PendingIncrement>>;

    async fn count(&self) -> Result<usize>;

    /// Drops a delivered increment. Unknown keys are ignored.
    async fn remove(&self, key: &IdempotencyKey) -> Result<()>;

    /// Counts one more failed delivery.
    async fn record_failure(&self, key: &IdempotencyKey) -> Result<()>;
}

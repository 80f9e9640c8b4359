//! Replay of availability increments that could not be delivered.
//!
//! A borrow whose decrement got no answer is queued with the decrement key
//! attached. Its decrement is replayed first and the copy is given back
//! only if that replay reports a decrement.

use std::sync::Arc;
use std::time::Duration;

use lending::{PendingIncrement, PendingIncrementStore};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::{Result, SagaError};
use crate::services::AvailabilityClient;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub applied: usize,
    pub remaining: usize,
}

/// Replays pending increments against the availability client.
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn AvailabilityClient>,
    pending: Arc<dyn PendingIncrementStore>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn AvailabilityClient>, pending: Arc<dyn PendingIncrementStore>) -> Self {
        Self { client, pending }
    }

    /// Tries every queued increment once. Delivered ones are removed,
    /// failed ones stay queued with their attempt count raised.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let batch = self.pending.list().await.map_err(SagaError::from_ledger)?;
        let mut report = ReconcileReport {
            attempted: batch.len(),
            ..Default::default()
        };

        for item in batch {
            match self.apply(&item).await {
                Ok(Some(available_copies)) => {
                    report.applied += 1;
                    tracing::info!(key = %item.key, book_id = %item.book_id, available_copies, "deferred increment applied");
                    self.pending
                        .remove(&item.key)
                        .await
                        .map_err(SagaError::from_ledger)?;
                }
                Ok(None) => {
                    report.applied += 1;
                    tracing::info!(key = %item.key, book_id = %item.book_id, "decrement never took a copy, nothing to give back");
                    self.pending
                        .remove(&item.key)
                        .await
                        .map_err(SagaError::from_ledger)?;
                }
                Err(e) => {
                    tracing::warn!(key = %item.key, attempts = item.attempts + 1, error = %e, "deferred increment still failing");
                    self.pending
                        .record_failure(&item.key)
                        .await
                        .map_err(SagaError::from_ledger)?;
                }
            }
        }

        report.remaining = self.pending.count().await.map_err(SagaError::from_ledger)?;
        metrics::gauge!("availability_increments_pending").set(report.remaining as f64);
        Ok(report)
    }

    /// Runs a pass every `period` until the task is aborted. A failed pass
    /// is logged and the next tick tries again.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                match self.run_once().await {
                    Ok(report) if report.attempted > 0 => {
                        tracing::info!(
                            attempted = report.attempted,
                            applied = report.applied,
                            remaining = report.remaining,
                            "reconciliation pass finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "reconciliation pass failed"),
                }
            }
        })
    }

    async fn apply(&self, item: &PendingIncrement) -> Result<Option<u32>> {
        if let Some(decrement_key) = &item.unresolved_decrement {
            let outcome = self
                .client
                .try_decrement(item.book_id, decrement_key)
                .await?;
            if !outcome.is_decremented() {
                return Ok(None);
            }
        }
        self.client
            .increment(item.book_id, &item.key)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LocalAvailabilityClient;
    use chrono::Utc;
    use common::{BookId, IdempotencyKey};
    use inventory::{AvailabilityStore, Book, DecrementOutcome, InMemoryAvailabilityStore};
    use lending::InMemoryPendingIncrements;

    async fn store_with(title: &str, copies: u32) -> (InMemoryAvailabilityStore, BookId) {
        let store = InMemoryAvailabilityStore::new();
        let book = Book::new(title, "Anonymous", copies);
        let book_id = book.id;
        store.add_book(book).await.unwrap();
        (store, book_id)
    }

    #[tokio::test]
    async fn run_once_applies_and_keeps_failures() {
        let (store, book_id) = store_with("Hyperion", 1).await;
        let outcome = store
            .try_decrement(book_id, &IdempotencyKey::random())
            .await
            .unwrap();
        assert!(outcome.is_decremented());

        let local = LocalAvailabilityClient::new(store.clone());
        let pending = Arc::new(InMemoryPendingIncrements::new());
        pending
            .push(PendingIncrement::new(IdempotencyKey::random(), book_id, Utc::now()))
            .await
            .unwrap();
        let reconciler = Reconciler::new(Arc::new(local.clone()), pending.clone());

        local.set_fail_on_increment(true);
        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report, ReconcileReport { attempted: 1, applied: 0, remaining: 1 });
        assert_eq!(pending.list().await.unwrap()[0].attempts, 2);

        local.set_fail_on_increment(false);
        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report, ReconcileReport { attempted: 1, applied: 1, remaining: 0 });
        assert_eq!(store.check_available(book_id).await.unwrap(), 1);
        assert!(matches!(
            store.try_decrement(book_id, &IdempotencyKey::random()).await.unwrap(),
            DecrementOutcome::Decremented { .. }
        ));
    }

    #[tokio::test]
    async fn unresolved_decrement_nets_to_zero_either_way() {
        let (store, book_id) = store_with("Solaris", 2).await;

        let applied = IdempotencyKey::random();
        store.try_decrement(book_id, &applied).await.unwrap();
        let never_sent = IdempotencyKey::random();

        let pending = Arc::new(InMemoryPendingIncrements::new());
        for decrement_key in [applied, never_sent] {
            pending
                .push(PendingIncrement::undo_decrement(
                    decrement_key,
                    IdempotencyKey::random(),
                    book_id,
                    Utc::now(),
                ))
                .await
                .unwrap();
        }
        let client = LocalAvailabilityClient::new(store.clone());
        let report = Reconciler::new(Arc::new(client), pending)
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(store.check_available(book_id).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_drains_the_queue() {
        let (store, book_id) = store_with("Kindred", 1).await;
        store
            .try_decrement(book_id, &IdempotencyKey::random())
            .await
            .unwrap();

        let pending = Arc::new(InMemoryPendingIncrements::new());
        pending
            .push(PendingIncrement::new(IdempotencyKey::random(), book_id, Utc::now()))
            .await
            .unwrap();
        let client = LocalAvailabilityClient::new(store.clone());
        let handle = Reconciler::new(Arc::new(client), pending.clone()).spawn(Duration::from_secs(30));

        for _ in 0..10 {
            if pending.count().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        handle.abort();

        assert_eq!(pending.count().await.unwrap(), 0);
        assert_eq!(store.check_available(book_id).await.unwrap(), 1);
    }
}

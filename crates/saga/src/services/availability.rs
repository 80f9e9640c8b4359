//! Availability client trait and an in-process implementation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{BookId, IdempotencyKey};
use inventory::{AvailabilityStore, Book, DecrementOutcome};

use crate::error::{Result, SagaError};

/// Remote operations the borrowing service may call on the inventory
/// service.
///
/// Both mutations carry an idempotency key, so a caller that lost a
/// response can repeat the call with the same key and get the original
/// outcome back.
#[async_trait]
pub trait AvailabilityClient: Send + Sync {
    /// Loads the book, or `None` if the inventory service does not know it.
    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>>;

    /// Current available count. Advisory only.
    async fn check_available(&self, book_id: BookId) -> Result<u32>;

    /// Conditional decrement.
    async fn try_decrement(
        &self,
        book_id: BookId,
        key: &IdempotencyKey,
    ) -> Result<DecrementOutcome>;

    /// Saturating increment. Returns the count afterwards.
    async fn increment(&self, book_id: BookId, key: &IdempotencyKey) -> Result<u32>;
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_decrement: AtomicBool,
    fail_on_increment: AtomicBool,
    lost_responses: AtomicU32,
    latency_ms: AtomicU32,
    decrement_calls: AtomicU32,
    increment_calls: AtomicU32,
}

/// Availability client calling an [`AvailabilityStore`] in the same process.
///
/// Carries switches to simulate an unreachable, slow or lossy inventory
/// service in tests.
#[derive(Clone)]
pub struct LocalAvailabilityClient<S> {
    store: S,
    faults: Arc<Faults>,
}

impl<S: AvailabilityStore> LocalAvailabilityClient<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Makes decrements fail before they reach the store.
    pub fn set_fail_on_decrement(&self, fail: bool) {
        self.faults.fail_on_decrement.store(fail, Ordering::SeqCst);
    }

    /// Makes increments fail before they reach the store.
    pub fn set_fail_on_increment(&self, fail: bool) {
        self.faults.fail_on_increment.store(fail, Ordering::SeqCst);
    }

    /// The next `count` mutations are applied but their responses are lost.
    pub fn lose_next_responses(&self, count: u32) {
        self.faults.lost_responses.store(count, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u32::try_from(latency.as_millis()).unwrap_or(u32::MAX);
        self.faults.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of decrement calls received, including failed ones.
    pub fn decrement_calls(&self) -> u32 {
        self.faults.decrement_calls.load(Ordering::SeqCst)
    }

    /// Number of increment calls received, including failed ones.
    pub fn increment_calls(&self) -> u32 {
        self.faults.increment_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let ms = self.faults.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
        }
    }

    fn take_lost_response(&self) -> bool {
        self.faults
            .lost_responses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<S: AvailabilityStore> AvailabilityClient for LocalAvailabilityClient<S> {
    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>> {
        self.simulate_latency().await;
        Ok(self.store.get_book(book_id).await?)
    }

    async fn check_available(&self, book_id: BookId) -> Result<u32> {
        self.simulate_latency().await;
        Ok(self.store.check_available(book_id).await?)
    }

    async fn try_decrement(
        &self,
        book_id: BookId,
        key: &IdempotencyKey,
    ) -> Result<DecrementOutcome> {
        self.faults.decrement_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.faults.fail_on_decrement.load(Ordering::SeqCst) {
            return Err(SagaError::RemoteUnavailable(
                "inventory service unreachable".to_string(),
            ));
        }

        let outcome = self.store.try_decrement(book_id, key).await?;
        if self.take_lost_response() {
            return Err(SagaError::RemoteUnavailable(
                "connection reset before response".to_string(),
            ));
        }
        Ok(outcome)
    }

    async fn increment(&self, book_id: BookId, key: &IdempotencyKey) -> Result<u32> {
        self.faults.increment_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.faults.fail_on_increment.load(Ordering::SeqCst) {
            return Err(SagaError::RemoteUnavailable(
                "inventory service unreachable".to_string(),
            ));
        }

        let available = self.store.increment(book_id, key).await?;
        if self.take_lost_response() {
            return Err(SagaError::RemoteUnavailable(
                "connection reset before response".to_string(),
            ));
        }
        Ok(available)
    }
}

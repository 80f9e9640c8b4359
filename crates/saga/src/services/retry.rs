//! Timeout and retry around an [`AvailabilityClient`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common::{BookId, IdempotencyKey};
use inventory::{Book, DecrementOutcome};

use super::AvailabilityClient;
use crate::config::LendingConfig;
use crate::error::{Result, SagaError};

/// Bounds every call by a timeout and retries calls that timed out or
/// could not reach the service.
///
/// Retrying a mutation is safe only because it repeats the same
/// idempotency key.
#[derive(Debug, Clone)]
pub struct RetryingClient<C> {
    inner: C,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl<C: AvailabilityClient> RetryingClient<C> {
    pub fn new(inner: C, timeout: Duration, retries: u32) -> Self {
        Self {
            inner,
            timeout,
            retries,
            backoff: Duration::from_millis(50),
        }
    }

    pub fn from_config(inner: C, config: &LendingConfig) -> Self {
        Self::new(inner, config.remote_timeout, config.remote_retries)
            .with_backoff(config.retry_backoff)
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut tries = 0;
        loop {
            let err = match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !err.is_retryable() => return Err(err),
                Ok(Err(err)) => err,
                Err(_) => SagaError::RemoteUnavailable(format!(
                    "{operation} timed out after {}ms",
                    self.timeout.as_millis()
                )),
            };

            if tries >= self.retries {
                tracing::warn!(operation, attempts = tries + 1, error = %err, "remote call gave up");
                return Err(err);
            }
            tracing::debug!(operation, attempt = tries + 1, error = %err, "retrying remote call");
            tokio::time::sleep(self.backoff * 2u32.saturating_pow(tries)).await;
            tries += 1;
        }
    }
}

#[async_trait]
impl<C: AvailabilityClient> AvailabilityClient for RetryingClient<C> {
    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>> {
        self.call("get_book", || self.inner.get_book(book_id)).await
    }

    async fn check_available(&self, book_id: BookId) -> Result<u32> {
        self.call("check_available", || self.inner.check_available(book_id))
            .await
    }

    async fn try_decrement(
        &self,
        book_id: BookId,
        key: &IdempotencyKey,
    ) -> Result<DecrementOutcome> {
        self.call("try_decrement", || self.inner.try_decrement(book_id, key))
            .await
    }

    async fn increment(&self, book_id: BookId, key: &IdempotencyKey) -> Result<u32> {
        self.call("increment", || self.inner.increment(book_id, key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LocalAvailabilityClient;
    use inventory::{AvailabilityStore, InMemoryAvailabilityStore};

    async fn setup(
        copies: u32,
    ) -> (
        LocalAvailabilityClient<InMemoryAvailabilityStore>,
        RetryingClient<LocalAvailabilityClient<InMemoryAvailabilityStore>>,
        BookId,
    ) {
        let store = InMemoryAvailabilityStore::new();
        let book = Book::new("Neuromancer", "William Gibson", copies);
        let id = book.id;
        store.add_book(book).await.unwrap();
        let local = LocalAvailabilityClient::new(store);
        let client = RetryingClient::new(local.clone(), Duration::from_millis(100), 2)
            .with_backoff(Duration::from_millis(1));
        (local, client, id)
    }

    #[tokio::test]
    async fn retry_after_lost_response_decrements_once() {
        let (local, client, book) = setup(3).await;
        local.lose_next_responses(1);

        let outcome = client
            .try_decrement(book, &IdempotencyKey::random())
            .await
            .unwrap();

        assert_eq!(outcome, DecrementOutcome::Decremented { available_copies: 2 });
        assert_eq!(local.decrement_calls(), 2);
        assert_eq!(local.check_available(book).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_configured_retries() {
        let (local, client, book) = setup(1).await;
        local.set_fail_on_increment(true);

        let result = client.increment(book, &IdempotencyKey::random()).await;

        assert!(matches!(result, Err(SagaError::RemoteUnavailable(_))));
        assert_eq!(local.increment_calls(), 3);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let (local, _, book) = setup(1).await;
        local.set_latency(Duration::from_millis(200));
        let client = RetryingClient::new(local.clone(), Duration::from_millis(20), 0);

        let result = client.check_available(book).await;

        assert!(matches!(result, Err(SagaError::RemoteUnavailable(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let (local, client, _) = setup(1).await;

        let result = client
            .try_decrement(BookId::new(), &IdempotencyKey::random())
            .await;

        assert!(matches!(result, Err(SagaError::BookNotFound(_))));
        assert_eq!(local.decrement_calls(), 1);
    }
}

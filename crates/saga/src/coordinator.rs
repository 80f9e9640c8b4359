//! Borrowing coordinator: the borrow and return sagas.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use common::{BookId, BorrowingId, Clock, IdempotencyKey, Money, SystemClock, UserId};
use inventory::{BookAvailability, DecrementOutcome};
use lending::{
    Borrowing, BorrowingLedger, FinePolicy, InMemoryPendingIncrements, LedgerStats,
    PendingIncrement, PendingIncrementStore, Reservation, ReservationQueue, UserDirectory,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::borrowing_saga;
use crate::cache::{self, Cache, NoopCache};
use crate::config::LendingConfig;
use crate::error::{Result, SagaError};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::services::AvailabilityClient;

/// Result of a committed return.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnOutcome {
    pub borrowing: Borrowing,
    /// The copy count was not updated yet; a reconciliation pass will.
    pub availability_deferred: bool,
    /// Reservation flagged for pickup, if anyone was waiting.
    pub notified: Option<Reservation>,
}

/// An active borrowing past its due date.
#[derive(Debug, Clone, Serialize)]
pub struct OverdueBorrowing {
    pub borrowing: Borrowing,
    pub days_overdue: u32,
    /// Fine the user would owe if they returned the book now.
    pub fine_due: Money,
}

/// Counts held by the borrowing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LendingStats {
    pub borrowings: LedgerStats,
    pub active_reservations: u64,
    pub pending_increments: usize,
}

/// Orchestrates borrowing and returning across the borrowing ledger and
/// the inventory service.
///
/// Borrow ordering is decrement first, then ledger insert. A rejected
/// insert is compensated by an increment under a key derived from the
/// borrowing id. A return commits in the ledger and then increments on a
/// best-effort basis; undelivered increments wait in a
/// [`PendingIncrementStore`].
pub struct BorrowingCoordinator {
    ledger: Arc<dyn BorrowingLedger>,
    reservations: Arc<dyn ReservationQueue>,
    availability: Arc<dyn AvailabilityClient>,
    users: Arc<dyn UserDirectory>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    pending: Arc<dyn PendingIncrementStore>,
    /// Bumped by every commit before its cache invalidation.
    cache_generation: AtomicU64,
    fines: FinePolicy,
    config: LendingConfig,
}

impl BorrowingCoordinator {
    /// Creates a coordinator with no cache, the system clock and an
    /// in-memory pending increment queue.
    pub fn new(
        ledger: Arc<dyn BorrowingLedger>,
        reservations: Arc<dyn ReservationQueue>,
        availability: Arc<dyn AvailabilityClient>,
        users: Arc<dyn UserDirectory>,
        config: LendingConfig,
    ) -> Self {
        Self {
            ledger,
            reservations,
            availability,
            users,
            cache: Arc::new(NoopCache),
            clock: Arc::new(SystemClock),
            pending: Arc::new(InMemoryPendingIncrements::new()),
            cache_generation: AtomicU64::new(0),
            fines: FinePolicy::new(config.fine_per_day),
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pending(mut self, pending: Arc<dyn PendingIncrementStore>) -> Self {
        self.pending = pending;
        self
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    /// Number of increments waiting for reconciliation.
    pub async fn pending_count(&self) -> Result<usize> {
        self.pending.count().await.map_err(SagaError::from_ledger)
    }

    /// Reconciler sharing this coordinator's client and pending queue.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.availability.clone(), self.pending.clone())
    }

    /// Borrows a book for the configured loan period.
    pub async fn borrow_book(&self, user_id: UserId, book_id: BookId) -> Result<Borrowing> {
        self.borrow_book_for(user_id, book_id, self.config.loan_period)
            .await
    }

    /// Borrows a book for `loan_period`.
    ///
    /// Local checks run first and in order: loan period valid, user exists,
    /// book exists, no active borrowing of this book, user under the limit.
    /// None of them mutates anything. The conditional decrement is then the
    /// authoritative availability check, and the ledger insert commits.
    #[tracing::instrument(skip(self), fields(saga = borrowing_saga::SAGA_BORROW))]
    pub async fn borrow_book_for(
        &self,
        user_id: UserId,
        book_id: BookId,
        loan_period: Duration,
    ) -> Result<Borrowing> {
        metrics::counter!("borrow_requests_total").increment(1);
        let started = Instant::now();

        let result = self.run_borrow(user_id, book_id, loan_period).await;

        metrics::histogram!("saga_duration_seconds", "saga" => borrowing_saga::SAGA_BORROW)
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(borrowing) => {
                tracing::info!(borrowing_id = %borrowing.id(), %user_id, %book_id, "book borrowed");
            }
            Err(e) => {
                metrics::counter!("borrow_rejected_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(%user_id, %book_id, reason = %e.kind(), error = %e, "borrow rejected");
            }
        }
        result
    }

    async fn run_borrow(
        &self,
        user_id: UserId,
        book_id: BookId,
        loan_period: Duration,
    ) -> Result<Borrowing> {
        tracing::debug!(step = borrowing_saga::STEP_CHECK_ELIGIBILITY, "saga step started");
        let borrowed_at = self.clock.now();
        let due_at = self.due_date(borrowed_at, loan_period)?;
        let available = self.check_eligibility(user_id, book_id).await?;
        if available == 0 {
            return Err(SagaError::NotAvailable(book_id));
        }

        let borrowing_id = BorrowingId::new();
        let decrement_key = IdempotencyKey::borrow(borrowing_id);

        tracing::debug!(step = borrowing_saga::STEP_DECREMENT_AVAILABILITY, "saga step started");
        match self.availability.try_decrement(book_id, &decrement_key).await {
            Ok(DecrementOutcome::Decremented { available_copies }) => {
                tracing::debug!(available_copies, "copy taken");
            }
            Ok(DecrementOutcome::NotAvailable) => return Err(SagaError::NotAvailable(book_id)),
            Err(e) if e.is_retryable() => {
                // The decrement may have landed with its response lost.
                self.queue_increment(PendingIncrement::undo_decrement(
                    decrement_key,
                    IdempotencyKey::compensate(borrowing_id),
                    book_id,
                    self.clock.now(),
                ))
                .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let borrowing =
            Borrowing::with_due_date(borrowing_id, user_id, book_id, borrowed_at, due_at);

        tracing::debug!(step = borrowing_saga::STEP_RECORD_BORROWING, "saga step started");
        if let Err(e) = self
            .ledger
            .insert(borrowing.clone(), self.config.borrow_limit)
            .await
        {
            let err = SagaError::from_ledger(e);
            self.compensate_decrement(borrowing_id, book_id, &err).await;
            return Err(err);
        }

        self.invalidate_after_commit(user_id).await;
        Ok(borrowing)
    }

    /// Due date of a loan starting at `borrowed_at`. Rejects periods that
    /// are not positive, exceed the configured maximum or leave the
    /// representable date range.
    fn due_date(&self, borrowed_at: DateTime<Utc>, loan_period: Duration) -> Result<DateTime<Utc>> {
        let max_days = self.config.max_loan_period_days;
        if loan_period <= Duration::zero() || loan_period > Duration::days(i64::from(max_days)) {
            return Err(SagaError::InvalidLoanPeriod(format!(
                "loan period must be between 1 second and {max_days} days"
            )));
        }
        borrowed_at
            .checked_add_signed(loan_period)
            .ok_or_else(|| SagaError::InvalidLoanPeriod("due date out of range".to_string()))
    }

    /// Runs the local preconditions and returns the advisory copy count.
    async fn check_eligibility(&self, user_id: UserId, book_id: BookId) -> Result<u32> {
        if self
            .users
            .get_user(user_id)
            .await
            .map_err(SagaError::from_ledger)?
            .is_none()
        {
            return Err(SagaError::UserNotFound(user_id));
        }

        let available = self.availability.check_available(book_id).await?;

        if self
            .ledger
            .find_active(user_id, book_id)
            .await
            .map_err(SagaError::from_ledger)?
            .is_some()
        {
            return Err(SagaError::AlreadyBorrowed { user_id, book_id });
        }

        let limit = self.config.borrow_limit;
        let active = self
            .ledger
            .count_active(user_id)
            .await
            .map_err(SagaError::from_ledger)?;
        if active >= limit {
            return Err(SagaError::LimitExceeded { user_id, limit });
        }

        Ok(available)
    }

    /// Gives back a copy taken for a borrowing the ledger refused.
    async fn compensate_decrement(&self, borrowing_id: BorrowingId, book_id: BookId, cause: &SagaError) {
        metrics::counter!("borrow_compensations_total").increment(1);
        tracing::warn!(
            step = borrowing_saga::STEP_COMPENSATE_DECREMENT,
            %borrowing_id,
            %book_id,
            cause = %cause,
            "ledger insert failed, releasing copy"
        );

        let key = IdempotencyKey::compensate(borrowing_id);
        if let Err(e) = self.availability.increment(book_id, &key).await {
            tracing::error!(%borrowing_id, %book_id, error = %e, "compensation failed, queued for reconciliation");
            self.queue_increment(PendingIncrement::new(key, book_id, self.clock.now()))
                .await;
        }
    }

    /// Returns a borrowed book.
    ///
    /// The ledger write is the commitment point. The increment that follows
    /// is best-effort: if the inventory service cannot be reached the
    /// return still succeeds and the increment is queued.
    #[tracing::instrument(skip(self), fields(saga = borrowing_saga::SAGA_RETURN))]
    pub async fn return_book(&self, borrowing_id: BorrowingId) -> Result<ReturnOutcome> {
        metrics::counter!("return_requests_total").increment(1);
        let started = Instant::now();

        let current = self
            .ledger
            .get(borrowing_id)
            .await
            .map_err(SagaError::from_ledger)?
            .ok_or(SagaError::BorrowingNotFound(borrowing_id))?;
        if current.is_returned() {
            return Err(SagaError::AlreadyReturned(borrowing_id));
        }

        let returned_at = self.clock.now();
        let fine = self
            .fines
            .assess(current.borrowed_at(), current.due_at(), returned_at);

        tracing::debug!(step = borrowing_saga::STEP_MARK_RETURNED, %fine, "saga step started");
        let borrowing = self
            .ledger
            .mark_returned(borrowing_id, returned_at, fine)
            .await
            .map_err(SagaError::from_ledger)?;
        let book_id = borrowing.book_id();

        tracing::debug!(step = borrowing_saga::STEP_INCREMENT_AVAILABILITY, "saga step started");
        let key = IdempotencyKey::give_back(borrowing_id);
        let availability_deferred = match self.availability.increment(book_id, &key).await {
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(%borrowing_id, %book_id, error = %e, "increment after return deferred");
                self.queue_increment(PendingIncrement::new(key, book_id, returned_at))
                    .await;
                true
            }
        };

        let notified = match self.reservations.notify_next(book_id).await {
            Ok(notified) => notified,
            Err(e) => {
                tracing::warn!(%book_id, error = %e, "could not notify next reservation");
                None
            }
        };

        self.invalidate_after_commit(borrowing.user_id()).await;

        metrics::histogram!("saga_duration_seconds", "saga" => borrowing_saga::SAGA_RETURN)
            .record(started.elapsed().as_secs_f64());
        tracing::info!(%borrowing_id, %book_id, %fine, availability_deferred, "book returned");

        Ok(ReturnOutcome {
            borrowing,
            availability_deferred,
            notified,
        })
    }

    /// Places the user in the book's reservation queue.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, user_id: UserId, book_id: BookId) -> Result<Reservation> {
        if self
            .users
            .get_user(user_id)
            .await
            .map_err(SagaError::from_ledger)?
            .is_none()
        {
            return Err(SagaError::UserNotFound(user_id));
        }
        if self.availability.get_book(book_id).await?.is_none() {
            return Err(SagaError::BookNotFound(book_id));
        }

        let reservation = self
            .reservations
            .reserve(user_id, book_id, self.clock.now())
            .await
            .map_err(SagaError::from_queue)?;

        metrics::counter!("reservations_created_total").increment(1);
        tracing::info!(reservation_id = %reservation.id, priority = reservation.priority, "reservation created");
        Ok(reservation)
    }

    /// Active reservations for a book in priority order.
    pub async fn reservations_for_book(&self, book_id: BookId) -> Result<Vec<Reservation>> {
        self.reservations
            .active_for_book(book_id)
            .await
            .map_err(SagaError::from_queue)
    }

    /// The user's active borrowings, read through the cache.
    pub async fn user_borrowings(&self, user_id: UserId) -> Result<Vec<Borrowing>> {
        let key = cache::user_borrowings_key(user_id);
        self.read_through(&key, move || async move {
            self.ledger
                .active_for_user(user_id)
                .await
                .map_err(SagaError::from_ledger)
        })
        .await
    }

    /// Copy counts for a book, read through the cache.
    pub async fn book_availability(&self, book_id: BookId) -> Result<BookAvailability> {
        let key = cache::book_availability_key(book_id);
        self.read_through(&key, move || async move {
            self.availability
                .get_book(book_id)
                .await?
                .map(|book| book.availability())
                .ok_or(SagaError::BookNotFound(book_id))
        })
        .await
    }

    /// Overdue borrowings as of now, most overdue first.
    pub async fn overdue(&self) -> Result<Vec<OverdueBorrowing>> {
        let now = self.clock.now();
        self.overdue_at(now).await
    }

    pub async fn overdue_at(&self, now: DateTime<Utc>) -> Result<Vec<OverdueBorrowing>> {
        let borrowings = self
            .ledger
            .overdue(now)
            .await
            .map_err(SagaError::from_ledger)?;
        Ok(borrowings
            .into_iter()
            .map(|borrowing| OverdueBorrowing {
                days_overdue: borrowing.days_overdue(now),
                fine_due: self
                    .fines
                    .assess(borrowing.borrowed_at(), borrowing.due_at(), now),
                borrowing,
            })
            .collect())
    }

    /// Ledger, reservation and reconciliation counts as of now. Read
    /// directly, never from the cache.
    pub async fn stats(&self) -> Result<LendingStats> {
        let borrowings = self
            .ledger
            .stats(self.clock.now())
            .await
            .map_err(SagaError::from_ledger)?;
        let active_reservations = self
            .reservations
            .count_active()
            .await
            .map_err(SagaError::from_ledger)?;
        Ok(LendingStats {
            borrowings,
            active_reservations,
            pending_increments: self.pending_count().await?,
        })
    }

    /// Retries every queued increment once.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconciler().run_once().await
    }

    async fn queue_increment(&self, pending: PendingIncrement) {
        metrics::counter!("availability_increments_deferred_total").increment(1);
        let (key, book_id) = (pending.key.clone(), pending.book_id);
        if let Err(e) = self.pending.push(pending).await {
            // Nothing else holds this increment; the key is enough to replay it.
            metrics::counter!("availability_increments_unqueued_total").increment(1);
            tracing::error!(%key, %book_id, error = %e, "could not queue pending increment");
        }
    }

    async fn read_through<T, F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => tracing::warn!(key, error = %e, "discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "cache read failed, reading store"),
        }

        let generation = self.cache_generation.load(Ordering::SeqCst);
        let value = load().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(key, raw).await {
                    tracing::warn!(key, error = %e, "cache write failed");
                } else if self.cache_generation.load(Ordering::SeqCst) != generation {
                    // A commit ran while loading; the value may predate it.
                    if let Err(e) = self.cache.invalidate(key).await {
                        tracing::warn!(key, error = %e, "cache invalidation failed");
                    }
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "could not serialize value for cache"),
        }
        Ok(value)
    }

    async fn invalidate_after_commit(&self, user_id: UserId) {
        self.cache_generation.fetch_add(1, Ordering::SeqCst);
        for pattern in [cache::BOOKS_PATTERN.to_string(), cache::user_pattern(user_id)] {
            if let Err(e) = self.cache.invalidate(&pattern).await {
                tracing::warn!(%pattern, error = %e, "cache invalidation failed");
            }
        }
    }
}

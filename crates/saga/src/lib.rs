//! Borrow and return sagas for the borrowing service.
//!
//! The borrowing service owns the borrowing ledger and the reservation
//! queue; copy counts belong to the inventory service and are reached only
//! through an [`AvailabilityClient`]. No transaction spans the two, so:
//!
//! 1. A borrow takes a copy with a conditional decrement, then records the
//!    borrowing. If the ledger refuses the record the copy is given back.
//! 2. A return closes the borrowing with its fine, then gives the copy back
//!    on a best-effort basis. Increments that do not arrive are queued and
//!    replayed by the [`Reconciler`].
//!
//! Every remote mutation carries an idempotency key derived from the
//! borrowing id, so retries never apply twice.

pub mod borrowing_saga;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod reconcile;
pub mod services;

pub use cache::{Cache, InMemoryCache, NoopCache};
pub use config::LendingConfig;
pub use coordinator::{BorrowingCoordinator, LendingStats, OverdueBorrowing, ReturnOutcome};
pub use error::{CacheError, ErrorKind, Result, SagaError};
pub use lending::{
    InMemoryPendingIncrements, PendingIncrement, PendingIncrementStore, PostgresPendingIncrements,
};
pub use reconcile::{ReconcileReport, Reconciler};
pub use services::{AvailabilityClient, LocalAvailabilityClient, RetryingClient};

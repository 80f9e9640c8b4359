//! Lending records owned by the borrowing service.
//!
//! This crate provides:
//! - `Borrowing` and `Reservation` records, which reference books and users by id only
//! - the fine calculator
//! - `BorrowingLedger` with conditional insert and conditional return
//! - `ReservationQueue` with priorities serialized per book
//! - `UserDirectory`, the borrowing service's view of the user service
//! - `PendingIncrementStore`, increments still owed to the inventory service

pub mod borrowing;
pub mod error;
pub mod fine;
pub mod ledger;
pub mod pending;
pub mod queue;
pub mod reservation;
pub mod user;

pub use borrowing::Borrowing;
pub use common::{BookId, BorrowingId, Money, ReservationId, UserId};
pub use error::{LendingError, Result};
pub use fine::{FinePolicy, days_overdue, fine};
pub use ledger::{BorrowingLedger, InMemoryBorrowingLedger, LedgerStats, PostgresBorrowingLedger};
pub use pending::{
    InMemoryPendingIncrements, PendingIncrement, PendingIncrementStore, PostgresPendingIncrements,
};
pub use queue::{InMemoryReservationQueue, PostgresReservationQueue, ReservationQueue};
pub use reservation::{Reservation, ReservationStatus};
pub use user::{InMemoryUserDirectory, PostgresUserDirectory, Role, User, UserDirectory};

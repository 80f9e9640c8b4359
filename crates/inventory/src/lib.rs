//! Book inventory and availability counts.
//!
//! The inventory service is the only owner of copy counts. Callers mutate
//! them exclusively through [`AvailabilityStore::try_decrement`] and
//! [`AvailabilityStore::increment`], both of which are single atomic
//! operations at the data layer and both of which are idempotent per
//! [`IdempotencyKey`].

pub mod book;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use book::{Book, BookAvailability};
pub use common::{BookId, IdempotencyKey};
pub use error::{InventoryError, Result};
pub use memory::InMemoryAvailabilityStore;
pub use postgres::PostgresAvailabilityStore;
pub use store::{AvailabilityStore, DecrementOutcome, MutationOutcome};

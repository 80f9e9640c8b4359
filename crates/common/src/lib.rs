//! Shared types for the lending services.
//!
//! Every service references entities owned by another service through the
//! typed identifiers defined here, never through a loaded object.

pub mod ids;
pub mod money;
pub mod time;

pub use ids::{BookId, BorrowingId, IdempotencyKey, ReservationId, UserId};
pub use money::Money;
pub use time::{Clock, ManualClock, SystemClock, parse_timestamp};

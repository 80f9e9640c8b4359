//! The borrowing service's handle to the inventory service.

pub mod availability;
pub mod retry;

pub use availability::{AvailabilityClient, LocalAvailabilityClient};
pub use retry::RetryingClient;

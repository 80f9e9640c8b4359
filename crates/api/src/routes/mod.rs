//! HTTP handlers grouped by resource.

pub mod books;
pub mod borrowings;
pub mod health;
pub mod metrics;
pub mod reservations;
pub mod stats;
pub mod users;

use std::str::FromStr;
use std::sync::Arc;

use inventory::AvailabilityStore;
use lending::UserDirectory;
use saga::BorrowingCoordinator;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: BorrowingCoordinator,
    /// Catalogue side of the inventory service.
    pub catalogue: Arc<dyn AvailabilityStore>,
    pub users: Arc<dyn UserDirectory>,
}

/// Parses a typed id from a path segment or request field.
pub(crate) fn parse_id<T>(field: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}

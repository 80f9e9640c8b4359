use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookId, ReservationId, UserId};

/// Lifecycle of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Waiting in the queue.
    #[default]
    Active,
    Fulfilled,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ReservationStatus::Active),
            "fulfilled" => Some(ReservationStatus::Fulfilled),
            "cancelled" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's place in the queue for a book.
///
/// `priority` is assigned once, at creation, and is never renumbered while
/// the reservation is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub reserved_at: DateTime<Utc>,
    pub status: ReservationStatus,
    pub priority: u32,
    pub notified: bool,
}

impl Reservation {
    pub(crate) fn new(
        user_id: UserId,
        book_id: BookId,
        reserved_at: DateTime<Utc>,
        priority: u32,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            user_id,
            book_id,
            reserved_at,
            status: ReservationStatus::Active,
            priority,
            notified: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReservationStatus::Active,
            ReservationStatus::Fulfilled,
            ReservationStatus::Cancelled,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("pending"), None);
    }

    #[test]
    fn new_reservation_is_active_and_unnotified() {
        let r = Reservation::new(UserId::new(), BookId::new(), Utc::now(), 1);
        assert!(r.is_active());
        assert!(!r.notified);
        assert_eq!(serde_json::to_value(r.status).unwrap(), "active");
    }
}

//! Borrow, return and borrowing list endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BookId, BorrowingId, UserId};
use lending::Borrowing;
use saga::{OverdueBorrowing, ReconcileReport, ReturnOutcome};
use serde::{Deserialize, Serialize};

use super::reservations::ReservationResponse;
use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct BorrowRequest {
    pub user_id: String,
    pub book_id: String,
    /// Overrides the configured loan period.
    pub loan_period_days: Option<u32>,
}

#[derive(Deserialize)]
pub struct OverdueQuery {
    /// Evaluate overdue status at this instant instead of now. RFC 3339,
    /// or a naive timestamp taken as UTC.
    pub as_of: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct BorrowingResponse {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub returned: bool,
    pub fine_amount: String,
    pub fine_cents: i64,
}

impl From<&Borrowing> for BorrowingResponse {
    fn from(b: &Borrowing) -> Self {
        Self {
            id: b.id().to_string(),
            user_id: b.user_id().to_string(),
            book_id: b.book_id().to_string(),
            borrowed_at: b.borrowed_at(),
            due_at: b.due_at(),
            returned_at: b.returned_at(),
            returned: b.is_returned(),
            fine_amount: b.fine_amount().to_string(),
            fine_cents: b.fine_amount().cents(),
        }
    }
}

#[derive(Serialize)]
pub struct ReturnResponse {
    pub borrowing: BorrowingResponse,
    pub availability_deferred: bool,
    pub notified_reservation: Option<ReservationResponse>,
}

impl From<ReturnOutcome> for ReturnResponse {
    fn from(outcome: ReturnOutcome) -> Self {
        Self {
            borrowing: BorrowingResponse::from(&outcome.borrowing),
            availability_deferred: outcome.availability_deferred,
            notified_reservation: outcome.notified.as_ref().map(ReservationResponse::from),
        }
    }
}

#[derive(Serialize)]
pub struct OverdueResponse {
    pub borrowing: BorrowingResponse,
    pub days_overdue: u32,
    pub fine_due: String,
}

impl From<&OverdueBorrowing> for OverdueResponse {
    fn from(o: &OverdueBorrowing) -> Self {
        Self {
            borrowing: BorrowingResponse::from(&o.borrowing),
            days_overdue: o.days_overdue,
            fine_due: o.fine_due.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct UserBorrowingsResponse {
    pub user_id: String,
    pub count: usize,
    pub borrowings: Vec<BorrowingResponse>,
}

// -- Handlers --

/// POST /borrowings: borrow a book.
#[tracing::instrument(skip(state, req))]
pub async fn borrow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BorrowRequest>,
) -> Result<(StatusCode, Json<BorrowingResponse>), ApiError> {
    let user_id: UserId = parse_id("user_id", &req.user_id)?;
    let book_id: BookId = parse_id("book_id", &req.book_id)?;

    let max_days = state.coordinator.config().max_loan_period_days;
    let borrowing = match req.loan_period_days {
        Some(days) if days == 0 || days > max_days => {
            return Err(ApiError::BadRequest(format!(
                "loan_period_days must be between 1 and {max_days}"
            )));
        }
        Some(days) => {
            state
                .coordinator
                .borrow_book_for(user_id, book_id, chrono::Duration::days(i64::from(days)))
                .await?
        }
        None => state.coordinator.borrow_book(user_id, book_id).await?,
    };

    Ok((StatusCode::CREATED, Json(BorrowingResponse::from(&borrowing))))
}

/// POST /borrowings/{id}/return: return a borrowed book.
#[tracing::instrument(skip(state))]
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ReturnResponse>, ApiError> {
    let borrowing_id: BorrowingId = parse_id("borrowing id", &id)?;
    let outcome = state.coordinator.return_book(borrowing_id).await?;
    Ok(Json(ReturnResponse::from(outcome)))
}

/// GET /users/{id}/borrowings: a user's active borrowings.
#[tracing::instrument(skip(state))]
pub async fn for_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserBorrowingsResponse>, ApiError> {
    let user_id: UserId = parse_id("user id", &id)?;
    let borrowings = state.coordinator.user_borrowings(user_id).await?;

    Ok(Json(UserBorrowingsResponse {
        user_id: user_id.to_string(),
        count: borrowings.len(),
        borrowings: borrowings.iter().map(BorrowingResponse::from).collect(),
    }))
}

/// GET /borrowings/overdue: all overdue borrowings, most overdue first.
///
/// `?as_of=<timestamp>` evaluates the list at another instant.
pub async fn overdue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OverdueQuery>,
) -> Result<Json<Vec<OverdueResponse>>, ApiError> {
    let overdue = match query.as_of.as_deref() {
        Some(raw) => {
            let as_of = common::parse_timestamp(raw)
                .map_err(|e| ApiError::BadRequest(format!("Invalid as_of: {e}")))?;
            state.coordinator.overdue_at(as_of).await?
        }
        None => state.coordinator.overdue().await?,
    };
    Ok(Json(overdue.iter().map(OverdueResponse::from).collect()))
}

/// POST /reconcile: retry availability increments that did not arrive.
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileReport>, ApiError> {
    Ok(Json(state.coordinator.reconcile().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::Money;

    #[test]
    fn borrowing_response_formats_fine() {
        let now = Utc::now();
        let b = Borrowing::with_due_date(
            BorrowingId::new(),
            UserId::new(),
            BookId::new(),
            now - Duration::days(20),
            now - Duration::days(6),
        );
        let response = BorrowingResponse::from(&b);
        assert_eq!(response.fine_amount, Money::zero().to_string());
        assert!(!response.returned);
        assert_eq!(response.book_id, b.book_id().to_string());
    }
}

//! Reservation queue endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BookId, UserId};
use lending::Reservation;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ReserveRequest {
    pub user_id: String,
    pub book_id: String,
}

#[derive(Serialize)]
pub struct ReservationResponse {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub reserved_at: DateTime<Utc>,
    pub status: String,
    pub priority: u32,
    pub notified: bool,
}

impl From<&Reservation> for ReservationResponse {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            user_id: r.user_id.to_string(),
            book_id: r.book_id.to_string(),
            reserved_at: r.reserved_at,
            status: r.status.to_string(),
            priority: r.priority,
            notified: r.notified,
        }
    }
}

/// POST /reservations: join a book's reservation queue.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let user_id: UserId = parse_id("user_id", &req.user_id)?;
    let book_id: BookId = parse_id("book_id", &req.book_id)?;

    let reservation = state.coordinator.reserve(user_id, book_id).await?;
    Ok((StatusCode::CREATED, Json(ReservationResponse::from(&reservation))))
}

/// GET /books/{id}/reservations: active reservations in priority order.
#[tracing::instrument(skip(state))]
pub async fn for_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let book_id: BookId = parse_id("book id", &id)?;
    let reservations = state.coordinator.reservations_for_book(book_id).await?;
    Ok(Json(
        reservations.iter().map(ReservationResponse::from).collect(),
    ))
}

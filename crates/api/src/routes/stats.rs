//! Library-wide statistics.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct BookStats {
    /// Copies across the catalogue.
    pub total_copies: u64,
    pub available_copies: u64,
    pub borrowed_copies: u64,
    /// Distinct titles.
    pub titles: u64,
}

#[derive(Debug, Serialize)]
pub struct BorrowingStats {
    pub total: u64,
    pub active: u64,
    pub overdue: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub books: BookStats,
    pub users: u64,
    pub borrowings: BorrowingStats,
    pub active_reservations: u64,
    pub pending_increments: usize,
}

/// GET /stats: catalogue, user and lending counts.
#[tracing::instrument(skip(state))]
pub async fn get(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let books = state.catalogue.list_books(None).await?;
    let users = state.users.count_users().await?;
    let lending = state.coordinator.stats().await?;

    let mut book_stats = BookStats {
        total_copies: 0,
        available_copies: 0,
        borrowed_copies: 0,
        titles: books.len() as u64,
    };
    for book in &books {
        book_stats.total_copies += u64::from(book.total_copies);
        book_stats.available_copies += u64::from(book.available_copies);
        book_stats.borrowed_copies +=
            u64::from(book.total_copies.saturating_sub(book.available_copies));
    }

    Ok(Json(StatsResponse {
        books: book_stats,
        users,
        borrowings: BorrowingStats {
            total: lending.borrowings.total,
            active: lending.borrowings.active,
            overdue: lending.borrowings.overdue,
        },
        active_reservations: lending.active_reservations,
        pending_increments: lending.pending_increments,
    }))
}

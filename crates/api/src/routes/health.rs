//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Availability increments waiting for reconciliation. Absent when
    /// the backlog could not be read.
    pub pending_increments: Option<usize>,
}

/// GET /health: liveness check with the reconciliation backlog.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pending_increments = match state.coordinator.pending_count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "could not read pending increments");
            None
        }
    };
    Json(HealthResponse {
        status: if pending_increments == Some(0) { "ok" } else { "degraded" },
        pending_increments,
    })
}

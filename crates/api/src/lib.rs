//! HTTP API of the borrowing service.
//!
//! Provides REST endpoints for borrowing, returning and reserving books,
//! with structured logging (tracing) and Prometheus metrics. Stores are
//! in memory by default and in PostgreSQL when a database URL is given.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use inventory::{InMemoryAvailabilityStore, PostgresAvailabilityStore};
use lending::{
    InMemoryBorrowingLedger, InMemoryReservationQueue, InMemoryUserDirectory,
    PostgresBorrowingLedger, PostgresPendingIncrements, PostgresReservationQueue,
    PostgresUserDirectory,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    BorrowingCoordinator, InMemoryCache, LendingConfig, LocalAvailabilityClient, RetryingClient,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use error::StartupError;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/stats", get(routes::stats::get))
        .route("/users", post(routes::users::create))
        .route("/users/{id}/borrowings", get(routes::borrowings::for_user))
        .route("/books", post(routes::books::create))
        .route("/books", get(routes::books::list))
        .route("/books/{id}/availability", get(routes::books::availability))
        .route("/books/{id}/reservations", get(routes::reservations::for_book))
        .route("/borrowings", post(routes::borrowings::borrow))
        .route("/borrowings/overdue", get(routes::borrowings::overdue))
        .route("/borrowings/{id}/return", post(routes::borrowings::return_book))
        .route("/reservations", post(routes::reservations::create))
        .route("/reconcile", post(routes::borrowings::reconcile))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed by in-memory stores.
///
/// The inventory store is reached through the same timeout and retry
/// wrapper a remote inventory service would be.
pub fn create_default_state(config: &LendingConfig) -> Arc<AppState> {
    let catalogue = InMemoryAvailabilityStore::new();
    let users = InMemoryUserDirectory::new();
    let availability =
        RetryingClient::from_config(LocalAvailabilityClient::new(catalogue.clone()), config);

    let coordinator = BorrowingCoordinator::new(
        Arc::new(InMemoryBorrowingLedger::new()),
        Arc::new(InMemoryReservationQueue::new()),
        Arc::new(availability),
        Arc::new(users.clone()),
        config.clone(),
    )
    .with_cache(Arc::new(InMemoryCache::new(config.cache_ttl)));

    Arc::new(AppState {
        coordinator,
        catalogue: Arc::new(catalogue),
        users: Arc::new(users),
    })
}

/// Creates application state backed by PostgreSQL, running migrations first.
pub async fn create_postgres_state(
    pool: PgPool,
    config: &LendingConfig,
) -> Result<Arc<AppState>, StartupError> {
    let catalogue = PostgresAvailabilityStore::new(pool.clone());
    catalogue.run_migrations().await?;
    let ledger = PostgresBorrowingLedger::new(pool.clone());
    ledger.run_migrations().await?;
    let users = PostgresUserDirectory::new(pool.clone());
    users.run_migrations().await?;

    let availability =
        RetryingClient::from_config(LocalAvailabilityClient::new(catalogue.clone()), config);

    let coordinator = BorrowingCoordinator::new(
        Arc::new(ledger),
        Arc::new(PostgresReservationQueue::new(pool.clone())),
        Arc::new(availability),
        Arc::new(users.clone()),
        config.clone(),
    )
    .with_cache(Arc::new(InMemoryCache::new(config.cache_ttl)))
    .with_pending(Arc::new(PostgresPendingIncrements::new(pool)));

    Ok(Arc::new(AppState {
        coordinator,
        catalogue: Arc::new(catalogue),
        users: Arc::new(users),
    }))
}

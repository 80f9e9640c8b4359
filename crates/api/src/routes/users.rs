//! User registration endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use lending::{Role, User};
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

/// POST /users: register a user with the user directory.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    let user = match req.role {
        Role::Member => User::member(req.name),
        Role::Staff => User::staff(req.name),
    };
    state.users.add_user(user.clone()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::auth::issue_token;
use crate::models::{AuthResponse, LoginRequest, Person, RegisterRequest};
use crate::services::persons;
use crate::AppState;

use super::{created, ApiError};

fn auth_response(state: &AppState, person: &Person) -> Result<AuthResponse, ApiError> {
    let token = issue_token(&state.config, person)?;
    Ok(AuthResponse {
        token,
        person_id: person.id,
        role: person.role,
    })
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let person = persons::register(&state.store, &req).await?;
    Ok(created(auth_response(&state, &person)?))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let person = persons::authenticate(&state.store, req.email.trim(), &req.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

    tracing::debug!("Login for {}", person.email);
    Ok(Json(auth_response(&state, &person)?))
}

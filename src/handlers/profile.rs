use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::models::*;
use crate::services::persons;
use crate::AppState;

use super::{ApiError, MessageResponse};

/// GET /api/v1/me
pub async fn get_profile(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Person>, ApiError> {
    Ok(Json(persons::get(&state.store, auth.id()).await?))
}

/// PUT /api/v1/me
pub async fn update_profile(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Person>, ApiError> {
    Ok(Json(persons::update_profile(&state.store, auth.id(), &req).await?))
}

/// PUT /api/v1/me/password
pub async fn change_password(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    persons::change_password(&state.store, auth.id(), &req).await?;
    Ok(MessageResponse::new("password changed"))
}

/// DELETE /api/v1/me
pub async fn delete_account(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    if auth.is_admin() {
        return Err(ApiError::bad_request("admin accounts are removed by another admin"));
    }
    persons::delete(&state.store, auth.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/me/owner-request
pub async fn request_owner(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Person>, ApiError> {
    auth.require_role(Role::Tenant)?;
    Ok(Json(persons::request_owner(&state.store, auth.id()).await?))
}

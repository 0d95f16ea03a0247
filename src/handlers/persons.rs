use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::db::found;
use crate::models::*;
use crate::services::persons;
use crate::AppState;

use super::{created, ApiError};

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: Option<Role>,
}

/// GET /api/v1/persons[?role=]
pub async fn list_persons(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(q): Query<RoleQuery>,
) -> Result<Json<Vec<Person>>, ApiError> {
    auth.require_role(Role::Admin)?;
    let persons = match q.role {
        Some(role) => state.store.list_persons_by_role(role).await?,
        None => state.store.list_persons().await?,
    };
    Ok(Json(persons))
}

pub async fn list_owner_requests(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Person>>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(state.store.list_owner_requests().await?))
}

pub async fn get_person(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Person>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(persons::get(&state.store, id).await?))
}

pub async fn get_person_by_email(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<Person>, ApiError> {
    auth.require_role(Role::Admin)?;
    let person = found(state.store.get_person_by_email(&email).await?, "Person", &email)?;
    Ok(Json(person))
}

pub async fn get_person_by_phone(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> Result<Json<Person>, ApiError> {
    auth.require_role(Role::Admin)?;
    let person = found(state.store.get_person_by_phone(&phone).await?, "Person", &phone)?;
    Ok(Json(person))
}

pub async fn create_person(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePersonRequest>,
) -> Result<(StatusCode, Json<Person>), ApiError> {
    auth.require_role(Role::Admin)?;
    let person = persons::create(&state.store, &req).await?;
    Ok(created(person))
}

pub async fn update_person(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePersonRequest>,
) -> Result<Json<Person>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(persons::update(&state.store, id, &req).await?))
}

pub async fn delete_person(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    auth.require_role(Role::Admin)?;
    if id == auth.id() {
        return Err(ApiError::bad_request("cannot delete your own admin account"));
    }
    persons::delete(&state.store, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/persons/:id/approve-owner
pub async fn approve_owner(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Person>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(persons::approve_owner(&state.store, id).await?))
}

/// POST /api/v1/persons/:id/reject-owner
pub async fn reject_owner(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Person>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(persons::reject_owner(&state.store, id).await?))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::models::*;
use crate::services::rental_requests;
use crate::AppState;

use super::{created, ApiError, CountResponse, StatusQuery};

/// GET /api/v1/rental-requests[?status=]
pub async fn list_requests(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(q): Query<StatusQuery<RequestStatus>>,
) -> Result<Json<Vec<RentalRequest>>, ApiError> {
    auth.require_role(Role::Admin)?;
    let requests = match q.status {
        Some(status) => state.store.list_rental_requests_by_status(status).await?,
        None => state.store.list_rental_requests().await?,
    };
    Ok(Json(requests))
}

pub async fn submit_request(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRentalRequest>,
) -> Result<(StatusCode, Json<RentalRequest>), ApiError> {
    auth.require_role(Role::Tenant)?;
    let request = rental_requests::submit(&state.store, &auth.actor(), &req).await?;
    Ok(created(request))
}

/// GET /api/v1/rental-requests/mine
pub async fn list_mine(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RentalRequest>>, ApiError> {
    auth.require_role(Role::Tenant)?;
    Ok(Json(state.store.list_rental_requests_by_tenant(auth.id()).await?))
}

pub async fn list_pending(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RentalRequest>>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(state.store.list_rental_requests_by_status(RequestStatus::Pending).await?))
}

pub async fn count_pending(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    auth.require_role(Role::Admin)?;
    let count = state.store.count_rental_requests_by_status(RequestStatus::Pending).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn get_request(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RentalRequest>, ApiError> {
    Ok(Json(rental_requests::get(&state.store, &auth.actor(), id).await?))
}

/// POST /api/v1/rental-requests/:id/accept
pub async fn accept_request(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RentalRequest>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(rental_requests::accept(&state.store, id).await?))
}

/// POST /api/v1/rental-requests/:id/refuse
pub async fn refuse_request(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<RefuseRequest>,
) -> Result<Json<RentalRequest>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(rental_requests::refuse(&state.store, id, req.reason.as_deref()).await?))
}

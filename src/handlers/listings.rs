use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::models::*;
use crate::services::listings;
use crate::AppState;

use super::{created, ApiError, CountResponse, StatusQuery};

// ========== Public ==========

/// GET /api/v1/public/listings: validated and available
pub async fn list_available(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Listing>>, ApiError> {
    Ok(Json(state.store.list_available_listings().await?))
}

/// GET /api/v1/public/listings/search?city=&property_type=&min_rent=&max_rent=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListingSearchQuery>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    if let (Some(min), Some(max)) = (query.min_rent, query.max_rent) {
        if min > max {
            return Err(ApiError::field("min_rent", "min_rent must not exceed max_rent"));
        }
    }
    Ok(Json(listings::search(&state.store, &query).await?))
}

// ========== Authenticated ==========

/// GET /api/v1/listings[?status=]
pub async fn list_listings(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(q): Query<StatusQuery<ModerationStatus>>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    auth.require_role(Role::Admin)?;
    let listings = match q.status {
        Some(status) => state.store.list_listings_by_moderation(status).await?,
        None => state.store.list_listings().await?,
    };
    Ok(Json(listings))
}

pub async fn create_listing(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<Listing>), ApiError> {
    auth.require_any(&[Role::Admin, Role::Landlord])?;
    let listing = listings::create(&state.store, &auth.actor(), &req).await?;
    Ok(created(listing))
}

pub async fn get_listing(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Listing>, ApiError> {
    Ok(Json(listings::get(&state.store, id).await?))
}

pub async fn get_listing_by_reference(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<Listing>, ApiError> {
    Ok(Json(listings::get_by_reference(&state.store, &reference).await?))
}

/// GET /api/v1/listings/owner/:owner_id
pub async fn list_by_owner(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    Ok(Json(listings::list_by_owner(&state.store, &auth.actor(), owner_id).await?))
}

/// GET /api/v1/listings/mine
pub async fn list_mine(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(state.store.list_listings_by_owner(auth.id()).await?))
}

pub async fn update_listing(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    auth.require_any(&[Role::Admin, Role::Landlord])?;
    Ok(Json(listings::update(&state.store, &auth.actor(), id, &req).await?))
}

pub async fn delete_listing(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    auth.require_any(&[Role::Admin, Role::Landlord])?;
    listings::delete(&state.store, &auth.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/listings/:id/occupancy
pub async fn set_occupancy(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<OccupancyRequest>,
) -> Result<Json<Listing>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(listings::set_occupancy(&state.store, id, req.status).await?))
}

/// PUT /api/v1/listings/:id/moderation
pub async fn moderate(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ModerateListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(listings::moderate(&state.store, id, &req).await?))
}

pub async fn list_pending(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(state.store.list_listings_by_moderation(ModerationStatus::Pending).await?))
}

pub async fn count_pending(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    auth.require_role(Role::Admin)?;
    let count = state.store.count_listings_by_moderation(ModerationStatus::Pending).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn stats(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListingStats>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(listings::stats(&state.store).await?))
}

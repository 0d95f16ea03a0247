use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::auth::AuthUser;
use crate::models::*;
use crate::services::{leases, payments};
use crate::AppState;

use super::{created, ApiError, StatusQuery};

/// GET /api/v1/leases[?status=]
pub async fn list_leases(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(q): Query<StatusQuery<LeaseStatus>>,
) -> Result<Json<Vec<Lease>>, ApiError> {
    auth.require_role(Role::Admin)?;
    let leases = match q.status {
        Some(status) => state.store.list_leases_by_status(status).await?,
        None => state.store.list_leases().await?,
    };
    Ok(Json(leases))
}

pub async fn create_lease(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLeaseRequest>,
) -> Result<(StatusCode, Json<Lease>), ApiError> {
    auth.require_role(Role::Admin)?;
    let lease = leases::create(&state.store, &req).await?;
    Ok(created(lease))
}

pub async fn get_lease(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Lease>, ApiError> {
    Ok(Json(leases::get(&state.store, &auth.actor(), id).await?))
}

pub async fn get_lease_by_reference(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<Lease>, ApiError> {
    Ok(Json(leases::get_by_reference(&state.store, &auth.actor(), &reference).await?))
}

/// GET /api/v1/leases/mine
pub async fn list_mine(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Lease>>, ApiError> {
    auth.require_role(Role::Tenant)?;
    Ok(Json(state.store.list_leases_by_tenant(auth.id()).await?))
}

pub async fn list_by_tenant(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
) -> Result<Json<Vec<Lease>>, ApiError> {
    Ok(Json(leases::list_by_tenant(&state.store, &auth.actor(), tenant_id).await?))
}

pub async fn list_by_listing(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<i64>,
) -> Result<Json<Vec<Lease>>, ApiError> {
    Ok(Json(leases::list_by_listing(&state.store, &auth.actor(), listing_id).await?))
}

pub async fn list_by_owner(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
) -> Result<Json<Vec<Lease>>, ApiError> {
    Ok(Json(leases::list_by_owner(&state.store, &auth.actor(), owner_id).await?))
}

pub async fn update_lease(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateLeaseRequest>,
) -> Result<Json<Lease>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(leases::update(&state.store, id, &req).await?))
}

/// POST /api/v1/leases/:id/terminate
pub async fn terminate_lease(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Lease>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(leases::terminate(&state.store, id).await?))
}

/// POST /api/v1/leases/expire-sweep
pub async fn expire_sweep(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepReport>, ApiError> {
    auth.require_role(Role::Admin)?;
    let today = chrono::Utc::now().date_naive();
    Ok(Json(leases::expire_overdue(&state.store, today).await?))
}

pub async fn delete_lease(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    auth.require_role(Role::Admin)?;
    leases::delete(&state.store, &state.documents, &state.receipts, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/leases/:id/payments
pub async fn list_payments(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(payments::list_by_lease(&state.store, &auth.actor(), id).await?))
}

/// POST /api/v1/leases/:id/document (multipart, field `document`)
pub async fn upload_document(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Lease>, ApiError> {
    auth.require_role(Role::Admin)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("document") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("lease.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;
        let lease = leases::attach_document(&state.store, &state.documents, id, &file_name, &bytes).await?;
        return Ok(Json(lease));
    }

    Err(ApiError::field("document", "a PDF file is required"))
}

/// GET /api/v1/leases/:id/document
pub async fn download_document(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (document, file) = leases::open_document(&state.store, &state.documents, &auth.actor(), id).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type.clone()),
            (header::CONTENT_LENGTH, document.size.to_string()),
            (header::CONTENT_DISPOSITION, attachment(&document.name)),
        ],
        body,
    )
        .into_response())
}

/// `Content-Disposition` value with a header-safe file name
pub(crate) fn attachment(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

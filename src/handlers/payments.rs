use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::models::*;
use crate::services::payments;
use crate::AppState;

use super::leases::attachment;
use super::{created, ApiError, OptionalJson};

/// GET /api/v1/payments
pub async fn list_payments(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(state.store.list_payments().await?))
}

/// GET /api/v1/payments/mine
pub async fn list_mine(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    auth.require_role(Role::Tenant)?;
    Ok(Json(state.store.list_payments_by_tenant(auth.id()).await?))
}

/// POST /api/v1/payments: open the payment of one lease month
pub async fn initiate_payment(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    auth.require_any(&[Role::Admin, Role::Tenant])?;
    let today = chrono::Utc::now().date_naive();
    let payment = payments::initiate(&state.store, &state.payment_policy(), &auth.actor(), &req, today).await?;
    Ok(created(payment))
}

pub async fn get_payment(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(payments::get(&state.store, &auth.actor(), id).await?))
}

/// POST /api/v1/payments/:id/capture
pub async fn capture_payment(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    OptionalJson(req): OptionalJson<CapturePaymentRequest>,
) -> Result<Json<Payment>, ApiError> {
    auth.require_any(&[Role::Admin, Role::Tenant])?;
    Ok(Json(payments::capture(&state.store, &auth.actor(), id, &req).await?))
}

/// POST /api/v1/payments/:id/fail
pub async fn fail_payment(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    OptionalJson(req): OptionalJson<FailPaymentRequest>,
) -> Result<Json<Payment>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(payments::fail(&state.store, id, req.reason.as_deref()).await?))
}

/// POST /api/v1/payments/:id/cancel
pub async fn cancel_payment(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(payments::cancel(&state.store, &state.payment_policy(), &state.receipts, id).await?))
}

/// GET /api/v1/payments/:id/receipt
pub async fn download_receipt(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (name, bytes) = payments::receipt(&state.store, &state.receipts, &auth.actor(), id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&name)),
        ],
        bytes,
    )
        .into_response())
}

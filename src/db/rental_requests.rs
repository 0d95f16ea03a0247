use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::row_helpers::map_rental_request_row;
use super::NotFoundError;
use crate::models::*;

/// Rental request database operations
pub struct RentalRequestRepo;

impl RentalRequestRepo {
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<RentalRequest>> {
        let rows = sqlx::query("SELECT * FROM rental_requests ORDER BY created_at DESC, id DESC")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_rental_request_row).collect())
    }

    pub async fn list_by_tenant(conn: &mut SqliteConnection, tenant_id: i64) -> Result<Vec<RentalRequest>> {
        let rows = sqlx::query("SELECT * FROM rental_requests WHERE tenant_id = ? ORDER BY created_at DESC, id DESC")
            .bind(tenant_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_rental_request_row).collect())
    }

    pub async fn list_by_status(conn: &mut SqliteConnection, status: RequestStatus) -> Result<Vec<RentalRequest>> {
        let rows = sqlx::query("SELECT * FROM rental_requests WHERE status = ? ORDER BY created_at, id")
            .bind(status)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_rental_request_row).collect())
    }

    pub async fn count_by_status(conn: &mut SqliteConnection, status: RequestStatus) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rental_requests WHERE status = ?")
            .bind(status)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.0)
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<RentalRequest>> {
        let row = sqlx::query("SELECT * FROM rental_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_rental_request_row))
    }

    /// Whether the tenant already has an unresolved request on the listing
    pub async fn has_pending(conn: &mut SqliteConnection, tenant_id: i64, listing_id: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM rental_requests WHERE tenant_id = ? AND listing_id = ? AND status = 'PENDING'",
        )
        .bind(tenant_id)
        .bind(listing_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.is_some())
    }

    pub async fn create(
        conn: &mut SqliteConnection,
        tenant_id: i64,
        req: &CreateRentalRequest,
    ) -> Result<RentalRequest> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO rental_requests (listing_id, tenant_id, desired_start, duration_months, message,
                                         status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'PENDING', ?, ?)
            "#,
        )
        .bind(req.listing_id)
        .bind(tenant_id)
        .bind(req.desired_start)
        .bind(req.duration_months)
        .bind(&req.message)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let new_id = result.last_insert_rowid();
        Self::get(conn, new_id)
            .await?
            .context("Rental request not found after creation")
    }

    /// Move a pending request to its terminal status
    pub async fn resolve(
        conn: &mut SqliteConnection,
        id: i64,
        status: RequestStatus,
        refusal_reason: Option<&str>,
        processed_at: DateTime<Utc>,
    ) -> Result<RentalRequest> {
        let result = sqlx::query(
            r#"
            UPDATE rental_requests SET status = ?, refusal_reason = ?, processed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(status)
        .bind(refusal_reason)
        .bind(processed_at)
        .bind(processed_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Pending rental request", &id.to_string()).into());
        }

        Self::get(conn, id)
            .await?
            .context("Rental request not found after update")
    }
}

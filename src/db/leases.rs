use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use super::row_helpers::map_lease_row;
use super::NotFoundError;
use crate::models::*;

/// Fully resolved terms of a lease about to be signed
#[derive(Debug, Clone)]
pub struct NewLease {
    pub reference: String,
    pub listing_id: i64,
    pub tenant_id: i64,
    pub rental_request_id: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Decimal,
    pub charges: Decimal,
    pub deposit: Decimal,
    pub payment_day: Option<i32>,
    pub lease_type: LeaseType,
    pub duration_months: i32,
    pub signed_on: Option<NaiveDate>,
    pub special_clauses: Option<String>,
}

/// Lease database operations
pub struct LeaseRepo;

impl LeaseRepo {
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Lease>> {
        let rows = sqlx::query("SELECT * FROM leases ORDER BY created_at DESC, id DESC")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_lease_row).collect())
    }

    pub async fn list_by_tenant(conn: &mut SqliteConnection, tenant_id: i64) -> Result<Vec<Lease>> {
        let rows = sqlx::query("SELECT * FROM leases WHERE tenant_id = ? ORDER BY start_date DESC, id DESC")
            .bind(tenant_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_lease_row).collect())
    }

    pub async fn list_by_listing(conn: &mut SqliteConnection, listing_id: i64) -> Result<Vec<Lease>> {
        let rows = sqlx::query("SELECT * FROM leases WHERE listing_id = ? ORDER BY start_date DESC, id DESC")
            .bind(listing_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_lease_row).collect())
    }

    /// Leases on every listing the landlord owns
    pub async fn list_by_owner(conn: &mut SqliteConnection, owner_id: i64) -> Result<Vec<Lease>> {
        let rows = sqlx::query(
            r#"
            SELECT l.* FROM leases l
            JOIN listings b ON b.id = l.listing_id
            WHERE b.owner_id = ?
            ORDER BY l.start_date DESC, l.id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.iter().map(map_lease_row).collect())
    }

    pub async fn list_by_status(conn: &mut SqliteConnection, status: LeaseStatus) -> Result<Vec<Lease>> {
        let rows = sqlx::query("SELECT * FROM leases WHERE status = ? ORDER BY start_date DESC, id DESC")
            .bind(status)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_lease_row).collect())
    }

    /// ACTIVE leases whose end date is strictly before `today`
    pub async fn list_overdue(conn: &mut SqliteConnection, today: NaiveDate) -> Result<Vec<Lease>> {
        let rows = sqlx::query("SELECT * FROM leases WHERE status = 'ACTIVE' AND end_date < ? ORDER BY end_date, id")
            .bind(today)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_lease_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Lease>> {
        let row = sqlx::query("SELECT * FROM leases WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_lease_row))
    }

    pub async fn get_by_reference(conn: &mut SqliteConnection, reference: &str) -> Result<Option<Lease>> {
        let row = sqlx::query("SELECT * FROM leases WHERE reference = ?")
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_lease_row))
    }

    pub async fn active_for_listing(conn: &mut SqliteConnection, listing_id: i64) -> Result<Option<Lease>> {
        let row = sqlx::query("SELECT * FROM leases WHERE listing_id = ? AND status = 'ACTIVE'")
            .bind(listing_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_lease_row))
    }

    pub async fn exists_for_request(conn: &mut SqliteConnection, rental_request_id: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM leases WHERE rental_request_id = ?")
            .bind(rental_request_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// Next free `CTR-{YEAR}-{NNNNNN}` reference
    pub async fn next_reference(conn: &mut SqliteConnection, year: i32) -> Result<String> {
        let prefix = format!("CTR-{}-", year);
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leases WHERE reference LIKE ?")
            .bind(format!("{}%", prefix))
            .fetch_one(&mut *conn)
            .await?;

        let mut seq = count.0 + 1;
        loop {
            let reference = format!("{}{:06}", prefix, seq);
            if Self::get_by_reference(conn, &reference).await?.is_none() {
                return Ok(reference);
            }
            seq += 1;
        }
    }

    pub async fn create(conn: &mut SqliteConnection, lease: &NewLease) -> Result<Lease> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO leases (reference, listing_id, tenant_id, rental_request_id, start_date, end_date,
                                monthly_rent, charges, deposit, payment_day, lease_type, duration_months,
                                status, signed_on, special_clauses, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'ACTIVE', ?, ?, ?, ?)
            "#,
        )
        .bind(&lease.reference)
        .bind(lease.listing_id)
        .bind(lease.tenant_id)
        .bind(lease.rental_request_id)
        .bind(lease.start_date)
        .bind(lease.end_date)
        .bind(lease.monthly_rent.to_string())
        .bind(lease.charges.to_string())
        .bind(lease.deposit.to_string())
        .bind(lease.payment_day)
        .bind(lease.lease_type)
        .bind(lease.duration_months)
        .bind(lease.signed_on)
        .bind(&lease.special_clauses)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let new_id = result.last_insert_rowid();
        Self::get(conn, new_id)
            .await?
            .context("Lease not found after creation")
    }

    /// Persist the amendable terms of a merged lease
    pub async fn save_terms(conn: &mut SqliteConnection, lease: &Lease) -> Result<Lease> {
        let result = sqlx::query(
            r#"
            UPDATE leases SET end_date = ?, monthly_rent = ?, charges = ?, payment_day = ?,
                              duration_months = ?, special_clauses = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(lease.end_date)
        .bind(lease.monthly_rent.to_string())
        .bind(lease.charges.to_string())
        .bind(lease.payment_day)
        .bind(lease.duration_months)
        .bind(&lease.special_clauses)
        .bind(Utc::now())
        .bind(lease.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Lease", &lease.id.to_string()).into());
        }

        Self::get(conn, lease.id)
            .await?
            .context("Lease not found after update")
    }

    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: i64,
        status: LeaseStatus,
        terminated_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE leases SET status = ?, terminated_at = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(terminated_at)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Lease", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn set_document(conn: &mut SqliteConnection, id: i64, document: Option<&LeaseDocument>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE leases SET document_uuid = ?, document_name = ?, document_type = ?, document_size = ?,
                              updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(document.map(|d| d.uuid.as_str()))
        .bind(document.map(|d| d.name.as_str()))
        .bind(document.map(|d| d.content_type.as_str()))
        .bind(document.map(|d| d.size))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Lease", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM leases WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Lease", &id.to_string()).into());
        }
        Ok(())
    }
}

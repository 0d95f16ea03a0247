use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqliteConnection;

use super::row_helpers::map_receipt_row;
use crate::models::Receipt;

/// Receipt bookkeeping; the PDF bytes live in the receipts directory
pub struct ReceiptRepo;

impl ReceiptRepo {
    pub async fn get_by_payment(conn: &mut SqliteConnection, payment_id: i64) -> Result<Option<Receipt>> {
        let row = sqlx::query("SELECT * FROM receipts WHERE payment_id = ?")
            .bind(payment_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_receipt_row))
    }

    /// File names of every receipt issued for a lease's payments
    pub async fn file_names_for_lease(conn: &mut SqliteConnection, lease_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT r.file_name FROM receipts r JOIN payments p ON p.id = r.payment_id WHERE p.lease_id = ?",
        )
        .bind(lease_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Record a (re)rendered receipt, refreshing the issue date
    pub async fn upsert(conn: &mut SqliteConnection, payment_id: i64, file_name: &str) -> Result<Receipt> {
        sqlx::query(
            r#"
            INSERT INTO receipts (payment_id, file_name, issued_at) VALUES (?, ?, ?)
            ON CONFLICT(payment_id) DO UPDATE SET file_name = excluded.file_name, issued_at = excluded.issued_at
            "#,
        )
        .bind(payment_id)
        .bind(file_name)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Self::get_by_payment(conn, payment_id)
            .await?
            .context("Receipt not found after upsert")
    }

    /// Forget the receipt of a payment, returning the file it pointed at
    pub async fn delete_by_payment(conn: &mut SqliteConnection, payment_id: i64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("DELETE FROM receipts WHERE payment_id = ? RETURNING file_name")
            .bind(payment_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|(name,)| name))
    }
}

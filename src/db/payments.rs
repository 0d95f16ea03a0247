use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use super::row_helpers::map_payment_row;
use super::NotFoundError;
use crate::models::*;

/// Amounts and period of a payment about to be opened or reopened
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub lease_id: i64,
    pub tenant_id: i64,
    pub rent_amount: Decimal,
    pub charges_amount: Decimal,
    pub month: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
}

impl NewPayment {
    pub fn total(&self) -> Decimal {
        self.rent_amount + self.charges_amount
    }
}

/// Payment database operations
pub struct PaymentRepo;

impl PaymentRepo {
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Payment>> {
        let rows = sqlx::query("SELECT * FROM payments ORDER BY month DESC, id DESC")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_payment_row).collect())
    }

    pub async fn list_by_lease(conn: &mut SqliteConnection, lease_id: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query("SELECT * FROM payments WHERE lease_id = ? ORDER BY month DESC, id DESC")
            .bind(lease_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_payment_row).collect())
    }

    pub async fn list_by_tenant(conn: &mut SqliteConnection, tenant_id: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query("SELECT * FROM payments WHERE tenant_id = ? ORDER BY month DESC, id DESC")
            .bind(tenant_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_payment_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_payment_row))
    }

    pub async fn get_for_month(conn: &mut SqliteConnection, lease_id: i64, month: NaiveDate) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE lease_id = ? AND month = ?")
            .bind(lease_id)
            .bind(month)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_payment_row))
    }

    /// Fresh `PAY-XXXXXXXX` reference not used by any payment
    pub async fn next_reference(conn: &mut SqliteConnection) -> Result<String> {
        loop {
            let token = uuid::Uuid::new_v4().simple().to_string();
            let reference = format!("PAY-{}", token[..8].to_uppercase());
            let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM payments WHERE reference = ?")
                .bind(&reference)
                .fetch_optional(&mut *conn)
                .await?;
            if row.is_none() {
                return Ok(reference);
            }
        }
    }

    pub async fn create(conn: &mut SqliteConnection, reference: &str, payment: &NewPayment) -> Result<Payment> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (reference, lease_id, tenant_id, rent_amount, charges_amount, total_amount,
                                  month, due_date, status, currency, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?, ?)
            "#,
        )
        .bind(reference)
        .bind(payment.lease_id)
        .bind(payment.tenant_id)
        .bind(payment.rent_amount.to_string())
        .bind(payment.charges_amount.to_string())
        .bind(payment.total().to_string())
        .bind(payment.month)
        .bind(payment.due_date)
        .bind(&payment.currency)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        let new_id = result.last_insert_rowid();
        Self::get(conn, new_id)
            .await?
            .context("Payment not found after creation")
    }

    /// Put a FAILED or CANCELLED payment back to PENDING with current lease amounts
    pub async fn reopen(conn: &mut SqliteConnection, id: i64, payment: &NewPayment) -> Result<Payment> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = 'PENDING', rent_amount = ?, charges_amount = ?, total_amount = ?,
                                due_date = ?, currency = ?, payment_method = NULL, transaction_ref = NULL,
                                failure_reason = NULL, captured_at = NULL, cancelled_at = NULL
            WHERE id = ? AND status IN ('FAILED', 'CANCELLED')
            "#,
        )
        .bind(payment.rent_amount.to_string())
        .bind(payment.charges_amount.to_string())
        .bind(payment.total().to_string())
        .bind(payment.due_date)
        .bind(&payment.currency)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Closed payment", &id.to_string()).into());
        }

        Self::get(conn, id)
            .await?
            .context("Payment not found after reopening")
    }

    /// PENDING to CAPTURED. The status guard in the WHERE clause makes a
    /// concurrent second capture affect no row.
    pub async fn capture(
        conn: &mut SqliteConnection,
        id: i64,
        transaction_ref: &str,
        payment_method: Option<&str>,
        captured_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = 'CAPTURED', transaction_ref = ?, payment_method = ?, captured_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(transaction_ref)
        .bind(payment_method)
        .bind(captured_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn fail(conn: &mut SqliteConnection, id: i64, reason: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE payments SET status = 'FAILED', failure_reason = ? WHERE id = ? AND status = 'PENDING'")
            .bind(reason)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn cancel(conn: &mut SqliteConnection, id: i64, cancelled_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'CANCELLED', cancelled_at = ? WHERE id = ? AND status IN ('PENDING', 'CAPTURED')",
        )
        .bind(cancelled_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Captured,
    Failed,
    /// Reversed by an admin; the row stays so the month can be reopened
    Cancelled,
}

/// Payment is one monthly rent obligation of a lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub reference: String,
    pub lease_id: i64,
    pub tenant_id: i64,
    pub rent_amount: Decimal,
    pub charges_amount: Decimal,
    pub total_amount: Decimal,
    /// First day of the month this payment covers
    pub month: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// InitiatePaymentRequest. `month` is `YYYY-MM`; defaults to the current month.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub lease_id: i64,
    #[serde(default)]
    pub month: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapturePaymentRequest {
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailPaymentRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Receipt records a rendered proof-of-payment PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub payment_id: i64,
    pub file_name: String,
    pub issued_at: DateTime<Utc>,
}

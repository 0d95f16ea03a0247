use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use super::{check_amount, Checked};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseStatus {
    Active,
    Terminated,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseType {
    Unfurnished,
    Furnished,
    Seasonal,
    Commercial,
}

/// Metadata of the signed lease PDF held in the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseDocument {
    pub uuid: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
}

/// Lease is a signed rental agreement between a tenant and a listing owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub id: i64,
    pub reference: String,
    pub listing_id: i64,
    pub tenant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_request_id: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Decimal,
    pub charges: Decimal,
    pub deposit: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_day: Option<i32>,
    pub lease_type: LeaseType,
    pub duration_months: i32,
    pub status: LeaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_clauses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<LeaseDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateLeaseRequest. Either `rental_request_id` or both `listing_id` and
/// `tenant_id` identify the parties; money terms default to the listing's.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLeaseRequest {
    #[serde(default)]
    pub rental_request_id: Option<i64>,
    #[serde(default)]
    pub listing_id: Option<i64>,
    #[serde(default)]
    pub tenant_id: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub monthly_rent: Option<Decimal>,
    #[serde(default)]
    pub charges: Option<Decimal>,
    #[serde(default)]
    pub deposit: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 1, max = 28, message = "payment day must be between 1 and 28"))]
    pub payment_day: Option<i32>,
    pub lease_type: LeaseType,
    #[serde(default)]
    pub signed_on: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 5000, message = "special clauses must not exceed 5000 characters"))]
    pub special_clauses: Option<String>,
}

impl Checked for CreateLeaseRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        check_amount(errors, "monthly_rent", self.monthly_rent.as_ref(), false, "monthly rent must be greater than 0");
        check_amount(errors, "charges", self.charges.as_ref(), true, "charges must be positive");
        check_amount(errors, "deposit", self.deposit.as_ref(), true, "deposit must be positive");
    }
}

/// UpdateLeaseRequest: only the terms that may change on an active lease
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLeaseRequest {
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub monthly_rent: Option<Decimal>,
    #[serde(default)]
    pub charges: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 1, max = 28, message = "payment day must be between 1 and 28"))]
    pub payment_day: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 5000, message = "special clauses must not exceed 5000 characters"))]
    pub special_clauses: Option<String>,
}

impl Checked for UpdateLeaseRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        check_amount(errors, "monthly_rent", self.monthly_rent.as_ref(), false, "monthly rent must be greater than 0");
        check_amount(errors, "charges", self.charges.as_ref(), true, "charges must be positive");
    }
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub references: Vec<String>,
}

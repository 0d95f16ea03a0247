use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use super::Checked;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Refused,
}

/// RentalRequest is a tenant's application to rent a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalRequest {
    pub id: i64,
    pub listing_id: i64,
    pub tenant_id: i64,
    pub desired_start: NaiveDate,
    pub duration_months: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRentalRequest {
    pub listing_id: i64,
    pub desired_start: NaiveDate,
    #[validate(range(min = 1, max = 120, message = "duration must be between 1 and 120 months"))]
    pub duration_months: i32,
    #[serde(default)]
    #[validate(length(max = 2000, message = "message must not exceed 2000 characters"))]
    pub message: Option<String>,
}

impl Checked for CreateRentalRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        if self.desired_start <= Utc::now().date_naive() {
            let mut err = ValidationError::new("future");
            err.message = Some("desired start date must be in the future".into());
            errors.add("desired_start", err);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefuseRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

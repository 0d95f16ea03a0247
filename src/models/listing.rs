use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use super::{check_amount, check_postal_code, Checked};

/// Admin moderation state of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationStatus {
    Pending,
    Validated,
    Rejected,
}

impl ModerationStatus {
    pub const ALL: [ModerationStatus; 3] = [Self::Pending, Self::Validated, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Validated => "VALIDATED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// Occupancy state of a listing, driven by leases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupancyStatus {
    Available,
    Rented,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Apartment,
    House,
    Studio,
    Commercial,
    Office,
    Garage,
    Land,
}

impl PropertyType {
    /// Short code embedded in listing references
    pub fn code(&self) -> &'static str {
        match self {
            Self::Apartment => "APT",
            Self::House => "HSE",
            Self::Studio => "STU",
            Self::Commercial => "COM",
            Self::Office => "OFF",
            Self::Garage => "GAR",
            Self::Land => "LND",
        }
    }
}

/// Listing is a rentable property unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub reference: String,
    pub property_type: PropertyType,
    pub moderation_status: ModerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub occupancy_status: OccupancyStatus,
    pub owner_id: i64,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub surface: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub monthly_rent: Decimal,
    pub charges: Decimal,
    pub deposit: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_on: Option<NaiveDate>,
    pub photos: Vec<String>,
    pub furnished: bool,
    pub balcony: bool,
    pub parking: bool,
    pub elevator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateListingRequest for submitting a new listing.
/// `owner_id` is only honoured for admins; landlords always own what they create.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateListingRequest {
    #[serde(default)]
    pub owner_id: Option<i64>,
    pub property_type: PropertyType,
    #[validate(length(min = 1, max = 255, message = "address is required (max 255 characters)"))]
    pub address: String,
    #[validate(length(min = 1, max = 100, message = "city is required (max 100 characters)"))]
    pub city: String,
    pub postal_code: String,
    #[validate(range(min = 1.0, message = "surface must be at least 1"))]
    pub surface: f64,
    #[serde(default)]
    #[validate(range(min = 1, message = "rooms must be at least 1"))]
    pub rooms: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, message = "bedrooms cannot be negative"))]
    pub bedrooms: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, message = "bathrooms cannot be negative"))]
    pub bathrooms: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 2000, message = "description must not exceed 2000 characters"))]
    pub description: Option<String>,
    pub monthly_rent: Decimal,
    #[serde(default)]
    pub charges: Option<Decimal>,
    #[serde(default)]
    pub deposit: Option<Decimal>,
    #[serde(default)]
    pub occupancy_status: Option<OccupancyStatus>,
    #[serde(default)]
    pub acquired_on: Option<NaiveDate>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub furnished: bool,
    #[serde(default)]
    pub balcony: bool,
    #[serde(default)]
    pub parking: bool,
    #[serde(default)]
    pub elevator: bool,
}

impl Checked for CreateListingRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        check_postal_code(errors, &self.postal_code);
        check_amount(errors, "monthly_rent", Some(&self.monthly_rent), false, "monthly rent must be greater than 0");
        check_amount(errors, "charges", self.charges.as_ref(), true, "charges must be positive");
        check_amount(errors, "deposit", self.deposit.as_ref(), true, "deposit must be positive");
    }
}

/// UpdateListingRequest: every field optional, only provided fields change
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateListingRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "reference must be 1-50 characters"))]
    pub reference: Option<String>,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "address must be 1-255 characters"))]
    pub address: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "city must be 1-100 characters"))]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1.0, message = "surface must be at least 1"))]
    pub surface: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 1, message = "rooms must be at least 1"))]
    pub rooms: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, message = "bedrooms cannot be negative"))]
    pub bedrooms: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, message = "bathrooms cannot be negative"))]
    pub bathrooms: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 2000, message = "description must not exceed 2000 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub monthly_rent: Option<Decimal>,
    #[serde(default)]
    pub charges: Option<Decimal>,
    #[serde(default)]
    pub deposit: Option<Decimal>,
    #[serde(default)]
    pub occupancy_status: Option<OccupancyStatus>,
    #[serde(default)]
    pub acquired_on: Option<NaiveDate>,
    #[serde(default)]
    pub photos: Option<Vec<String>>,
    #[serde(default)]
    pub furnished: Option<bool>,
    #[serde(default)]
    pub balcony: Option<bool>,
    #[serde(default)]
    pub parking: Option<bool>,
    #[serde(default)]
    pub elevator: Option<bool>,
}

impl Checked for UpdateListingRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        if let Some(postal_code) = &self.postal_code {
            check_postal_code(errors, postal_code);
        }
        check_amount(errors, "monthly_rent", self.monthly_rent.as_ref(), false, "monthly rent must be greater than 0");
        check_amount(errors, "charges", self.charges.as_ref(), true, "charges must be positive");
        check_amount(errors, "deposit", self.deposit.as_ref(), true, "deposit must be positive");
    }
}

/// Admin moderation decision
#[derive(Debug, Clone, Deserialize)]
pub struct ModerateListingRequest {
    pub status: ModerationStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OccupancyRequest {
    pub status: OccupancyStatus,
}

/// Listing counts per moderation status
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListingStats {
    pub total: i64,
    pub pending: i64,
    pub validated: i64,
    pub rejected: i64,
}

/// Public search filters; every filter is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingSearchQuery {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub min_rent: Option<Decimal>,
    #[serde(default)]
    pub max_rent: Option<Decimal>,
}

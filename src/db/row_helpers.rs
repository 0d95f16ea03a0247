use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use crate::models::*;

/// Filter empty strings to None, for columns where '' and NULL mean the same
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Money columns are stored as TEXT to keep exact decimal values
pub fn decimal(row: &SqliteRow, column: &str) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_default()
}

pub fn map_person_row(row: &SqliteRow) -> Person {
    Person {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone: none_if_empty(row.get("phone")),
        address: none_if_empty(row.get("address")),
        role: row.get("role"),
        verified: row.get("verified"),
        owner_request: row.get("owner_request"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_listing_row(row: &SqliteRow) -> Listing {
    let photos_json: String = row.get("photos");
    Listing {
        id: row.get("id"),
        reference: row.get("reference"),
        property_type: row.get("property_type"),
        moderation_status: row.get("moderation_status"),
        rejection_reason: none_if_empty(row.get("rejection_reason")),
        occupancy_status: row.get("occupancy_status"),
        owner_id: row.get("owner_id"),
        address: row.get("address"),
        city: row.get("city"),
        postal_code: row.get("postal_code"),
        surface: row.get("surface"),
        rooms: row.get("rooms"),
        bedrooms: row.get("bedrooms"),
        bathrooms: row.get("bathrooms"),
        description: none_if_empty(row.get("description")),
        monthly_rent: decimal(row, "monthly_rent"),
        charges: decimal(row, "charges"),
        deposit: decimal(row, "deposit"),
        acquired_on: row.get("acquired_on"),
        photos: serde_json::from_str(&photos_json).unwrap_or_default(),
        furnished: row.get("furnished"),
        balcony: row.get("balcony"),
        parking: row.get("parking"),
        elevator: row.get("elevator"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_rental_request_row(row: &SqliteRow) -> RentalRequest {
    RentalRequest {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        tenant_id: row.get("tenant_id"),
        desired_start: row.get("desired_start"),
        duration_months: row.get("duration_months"),
        message: none_if_empty(row.get("message")),
        status: row.get("status"),
        refusal_reason: none_if_empty(row.get("refusal_reason")),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_lease_row(row: &SqliteRow) -> Lease {
    let document = none_if_empty(row.get("document_uuid")).map(|uuid| LeaseDocument {
        uuid,
        name: row.get::<Option<String>, _>("document_name").unwrap_or_default(),
        content_type: row
            .get::<Option<String>, _>("document_type")
            .unwrap_or_else(|| "application/pdf".to_string()),
        size: row.get::<Option<i64>, _>("document_size").unwrap_or(0),
    });
    Lease {
        id: row.get("id"),
        reference: row.get("reference"),
        listing_id: row.get("listing_id"),
        tenant_id: row.get("tenant_id"),
        rental_request_id: row.get("rental_request_id"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        monthly_rent: decimal(row, "monthly_rent"),
        charges: decimal(row, "charges"),
        deposit: decimal(row, "deposit"),
        payment_day: row.get("payment_day"),
        lease_type: row.get("lease_type"),
        duration_months: row.get("duration_months"),
        status: row.get("status"),
        signed_on: row.get("signed_on"),
        special_clauses: none_if_empty(row.get("special_clauses")),
        document,
        terminated_at: row.get("terminated_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_payment_row(row: &SqliteRow) -> Payment {
    Payment {
        id: row.get("id"),
        reference: row.get("reference"),
        lease_id: row.get("lease_id"),
        tenant_id: row.get("tenant_id"),
        rent_amount: decimal(row, "rent_amount"),
        charges_amount: decimal(row, "charges_amount"),
        total_amount: decimal(row, "total_amount"),
        month: row.get("month"),
        due_date: row.get("due_date"),
        status: row.get("status"),
        currency: row.get("currency"),
        payment_method: none_if_empty(row.get("payment_method")),
        transaction_ref: none_if_empty(row.get("transaction_ref")),
        failure_reason: none_if_empty(row.get("failure_reason")),
        created_at: row.get("created_at"),
        captured_at: row.get("captured_at"),
        cancelled_at: row.get("cancelled_at"),
    }
}

pub fn map_receipt_row(row: &SqliteRow) -> Receipt {
    Receipt {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        file_name: row.get("file_name"),
        issued_at: row.get("issued_at"),
    }
}

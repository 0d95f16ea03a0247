use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::row_helpers::map_listing_row;
use super::NotFoundError;
use crate::models::*;

/// Listing database operations
pub struct ListingRepo;

impl ListingRepo {
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Listing>> {
        let rows = sqlx::query("SELECT * FROM listings ORDER BY created_at DESC, id DESC")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_listing_row).collect())
    }

    pub async fn list_by_owner(conn: &mut SqliteConnection, owner_id: i64) -> Result<Vec<Listing>> {
        let rows = sqlx::query("SELECT * FROM listings WHERE owner_id = ? ORDER BY created_at DESC, id DESC")
            .bind(owner_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_listing_row).collect())
    }

    pub async fn list_by_moderation(conn: &mut SqliteConnection, status: ModerationStatus) -> Result<Vec<Listing>> {
        let rows = sqlx::query("SELECT * FROM listings WHERE moderation_status = ? ORDER BY created_at, id")
            .bind(status)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_listing_row).collect())
    }

    pub async fn count_by_moderation(conn: &mut SqliteConnection, status: ModerationStatus) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM listings WHERE moderation_status = ?")
            .bind(status)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.0)
    }

    /// Validated listings that can be rented right now
    pub async fn list_available(conn: &mut SqliteConnection) -> Result<Vec<Listing>> {
        let rows = sqlx::query(
            "SELECT * FROM listings WHERE moderation_status = 'VALIDATED' AND occupancy_status = 'AVAILABLE' ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.iter().map(map_listing_row).collect())
    }

    /// Public search over validated listings. City matches case-insensitively
    /// on a substring; rent bounds are applied by the caller.
    pub async fn search(
        conn: &mut SqliteConnection,
        city: Option<&str>,
        property_type: Option<PropertyType>,
    ) -> Result<Vec<Listing>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM listings WHERE moderation_status = 'VALIDATED'");
        if let Some(city) = city.map(str::trim).filter(|c| !c.is_empty()) {
            qb.push(" AND LOWER(city) LIKE ")
                .push_bind(format!("%{}%", city.to_lowercase()));
        }
        if let Some(property_type) = property_type {
            qb.push(" AND property_type = ").push_bind(property_type);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb.build().fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(map_listing_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Listing>> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_listing_row))
    }

    pub async fn get_by_reference(conn: &mut SqliteConnection, reference: &str) -> Result<Option<Listing>> {
        let row = sqlx::query("SELECT * FROM listings WHERE reference = ?")
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_listing_row))
    }

    pub async fn reference_exists(conn: &mut SqliteConnection, reference: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM listings WHERE reference = ?")
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// Next free `LST-{TYPE}-{YEAR}-{NNN}` reference
    pub async fn next_reference(conn: &mut SqliteConnection, property_type: PropertyType, year: i32) -> Result<String> {
        let prefix = format!("LST-{}-{}-", property_type.code(), year);
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM listings WHERE reference LIKE ?")
            .bind(format!("{}%", prefix))
            .fetch_one(&mut *conn)
            .await?;

        let mut seq = count.0 + 1;
        loop {
            let reference = format!("{}{:03}", prefix, seq);
            if !Self::reference_exists(conn, &reference).await? {
                return Ok(reference);
            }
            seq += 1;
        }
    }

    pub async fn create(
        conn: &mut SqliteConnection,
        reference: &str,
        owner_id: i64,
        occupancy: OccupancyStatus,
        req: &CreateListingRequest,
    ) -> Result<Listing> {
        let now = Utc::now();
        let photos = serde_json::to_string(&req.photos)?;
        let result = sqlx::query(
            r#"
            INSERT INTO listings (reference, property_type, moderation_status, occupancy_status, owner_id,
                                  address, city, postal_code, surface, rooms, bedrooms, bathrooms, description,
                                  monthly_rent, charges, deposit, acquired_on, photos,
                                  furnished, balcony, parking, elevator, created_at, updated_at)
            VALUES (?, ?, 'PENDING', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reference)
        .bind(req.property_type)
        .bind(occupancy)
        .bind(owner_id)
        .bind(req.address.trim())
        .bind(req.city.trim())
        .bind(&req.postal_code)
        .bind(req.surface)
        .bind(req.rooms)
        .bind(req.bedrooms)
        .bind(req.bathrooms)
        .bind(&req.description)
        .bind(req.monthly_rent.to_string())
        .bind(req.charges.unwrap_or_default().to_string())
        .bind(req.deposit.unwrap_or_default().to_string())
        .bind(req.acquired_on)
        .bind(photos)
        .bind(req.furnished)
        .bind(req.balcony)
        .bind(req.parking)
        .bind(req.elevator)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let new_id = result.last_insert_rowid();
        Self::get(conn, new_id)
            .await?
            .context("Listing not found after creation")
    }

    /// Persist the descriptive and pricing columns of a merged listing.
    /// Status columns change only through `set_occupancy` / `set_moderation`.
    pub async fn save(conn: &mut SqliteConnection, listing: &Listing) -> Result<Listing> {
        let photos = serde_json::to_string(&listing.photos)?;
        let result = sqlx::query(
            r#"
            UPDATE listings SET reference = ?, property_type = ?, address = ?, city = ?, postal_code = ?,
                                surface = ?, rooms = ?, bedrooms = ?, bathrooms = ?, description = ?,
                                monthly_rent = ?, charges = ?, deposit = ?, acquired_on = ?, photos = ?,
                                furnished = ?, balcony = ?, parking = ?, elevator = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&listing.reference)
        .bind(listing.property_type)
        .bind(&listing.address)
        .bind(&listing.city)
        .bind(&listing.postal_code)
        .bind(listing.surface)
        .bind(listing.rooms)
        .bind(listing.bedrooms)
        .bind(listing.bathrooms)
        .bind(&listing.description)
        .bind(listing.monthly_rent.to_string())
        .bind(listing.charges.to_string())
        .bind(listing.deposit.to_string())
        .bind(listing.acquired_on)
        .bind(photos)
        .bind(listing.furnished)
        .bind(listing.balcony)
        .bind(listing.parking)
        .bind(listing.elevator)
        .bind(Utc::now())
        .bind(listing.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Listing", &listing.id.to_string()).into());
        }

        Self::get(conn, listing.id)
            .await?
            .context("Listing not found after update")
    }

    pub async fn set_occupancy(conn: &mut SqliteConnection, id: i64, status: OccupancyStatus) -> Result<()> {
        let result = sqlx::query("UPDATE listings SET occupancy_status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Listing", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn set_moderation(
        conn: &mut SqliteConnection,
        id: i64,
        status: ModerationStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET moderation_status = ?, rejection_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Listing", &id.to_string()).into());
        }
        Ok(())
    }

    /// Number of leases of any status that reference the listing
    pub async fn count_leases(conn: &mut SqliteConnection, id: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leases WHERE listing_id = ?")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.0)
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM listings WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Listing", &id.to_string()).into());
        }
        Ok(())
    }
}

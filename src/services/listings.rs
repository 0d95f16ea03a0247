use anyhow::Result;
use chrono::{Datelike, Utc};

use super::{ensure, invalid_field, Actor};
use crate::db::{found, LeaseRepo, ListingRepo, PersonRepo, Store};
use crate::models::*;
use crate::rules::{self, RuleViolation};

/// Submit a listing for moderation. Landlords own what they create; admins
/// name the owner in the body.
pub async fn create(store: &Store, actor: &Actor, req: &CreateListingRequest) -> Result<Listing> {
    req.check()?;
    let owner_id = match actor.role {
        Role::Admin => req
            .owner_id
            .ok_or_else(|| invalid_field("owner_id", "owner_id is required"))?,
        Role::Landlord => actor.id,
        Role::Tenant => return Err(super::AccessDenied("only landlords can create listings").into()),
    };
    let occupancy = req.occupancy_status.unwrap_or(OccupancyStatus::Available);
    // new listings are PENDING moderation
    rules::change_occupancy(ModerationStatus::Pending, OccupancyStatus::Available, occupancy, false)?;

    let mut tx = store.begin().await?;
    let owner = found(PersonRepo::get(&mut tx, owner_id).await?, "Person", owner_id)?;
    rules::ensure_verified_landlord(&owner)?;

    let reference = ListingRepo::next_reference(&mut tx, req.property_type, Utc::now().year()).await?;
    let listing = ListingRepo::create(&mut tx, &reference, owner_id, occupancy, req).await?;
    tx.commit().await?;

    tracing::info!("Listing {} created for owner {}", listing.reference, owner_id);
    Ok(listing)
}

pub async fn get(store: &Store, id: i64) -> Result<Listing> {
    found(store.get_listing(id).await?, "Listing", id)
}

pub async fn get_by_reference(store: &Store, reference: &str) -> Result<Listing> {
    found(store.get_listing_by_reference(reference).await?, "Listing", reference)
}

pub async fn list_by_owner(store: &Store, actor: &Actor, owner_id: i64) -> Result<Vec<Listing>> {
    ensure(actor.owns(owner_id), "cannot list another owner's listings")?;
    store.list_listings_by_owner(owner_id).await
}

/// Partial update by the owner or an admin
pub async fn update(store: &Store, actor: &Actor, id: i64, req: &UpdateListingRequest) -> Result<Listing> {
    req.check()?;

    let mut tx = store.begin().await?;
    let mut listing = found(ListingRepo::get(&mut tx, id).await?, "Listing", id)?;
    ensure(actor.owns(listing.owner_id), "cannot modify another owner's listing")?;

    if let Some(reference) = req.reference.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        if reference != listing.reference {
            if ListingRepo::reference_exists(&mut tx, reference).await? {
                return Err(RuleViolation::ReferenceTaken.into());
            }
            listing.reference = reference.to_string();
        }
    }
    if let Some(status) = req.occupancy_status {
        if status != listing.occupancy_status {
            let active = LeaseRepo::active_for_listing(&mut tx, id).await?.is_some();
            rules::change_occupancy(listing.moderation_status, listing.occupancy_status, status, active)?;
            ListingRepo::set_occupancy(&mut tx, id, status).await?;
        }
    }

    if let Some(v) = req.property_type {
        listing.property_type = v;
    }
    if let Some(v) = &req.address {
        listing.address = v.trim().to_string();
    }
    if let Some(v) = &req.city {
        listing.city = v.trim().to_string();
    }
    if let Some(v) = &req.postal_code {
        listing.postal_code = v.clone();
    }
    if let Some(v) = req.surface {
        listing.surface = v;
    }
    if req.rooms.is_some() {
        listing.rooms = req.rooms;
    }
    if req.bedrooms.is_some() {
        listing.bedrooms = req.bedrooms;
    }
    if req.bathrooms.is_some() {
        listing.bathrooms = req.bathrooms;
    }
    if req.description.is_some() {
        listing.description = req.description.clone();
    }
    if let Some(v) = req.monthly_rent {
        listing.monthly_rent = v;
    }
    if let Some(v) = req.charges {
        listing.charges = v;
    }
    if let Some(v) = req.deposit {
        listing.deposit = v;
    }
    if req.acquired_on.is_some() {
        listing.acquired_on = req.acquired_on;
    }
    if let Some(v) = &req.photos {
        listing.photos = v.clone();
    }
    listing.furnished = req.furnished.unwrap_or(listing.furnished);
    listing.balcony = req.balcony.unwrap_or(listing.balcony);
    listing.parking = req.parking.unwrap_or(listing.parking);
    listing.elevator = req.elevator.unwrap_or(listing.elevator);

    let listing = ListingRepo::save(&mut tx, &listing).await?;
    tx.commit().await?;

    tracing::info!("Listing {} updated", listing.reference);
    Ok(listing)
}

/// Delete a listing that never had a lease; its requests go with it
pub async fn delete(store: &Store, actor: &Actor, id: i64) -> Result<()> {
    let mut tx = store.begin().await?;
    let listing = found(ListingRepo::get(&mut tx, id).await?, "Listing", id)?;
    ensure(actor.owns(listing.owner_id), "cannot delete another owner's listing")?;

    if LeaseRepo::active_for_listing(&mut tx, id).await?.is_some() {
        return Err(RuleViolation::ActiveLeaseExists.into());
    }
    if ListingRepo::count_leases(&mut tx, id).await? > 0 {
        return Err(RuleViolation::ListingHasLeases.into());
    }
    ListingRepo::delete(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!("Listing {} deleted", listing.reference);
    Ok(())
}

pub async fn set_occupancy(store: &Store, id: i64, status: OccupancyStatus) -> Result<Listing> {
    let mut tx = store.begin().await?;
    let listing = found(ListingRepo::get(&mut tx, id).await?, "Listing", id)?;
    let active = LeaseRepo::active_for_listing(&mut tx, id).await?.is_some();
    rules::change_occupancy(listing.moderation_status, listing.occupancy_status, status, active)?;
    ListingRepo::set_occupancy(&mut tx, id, status).await?;
    let listing = found(ListingRepo::get(&mut tx, id).await?, "Listing", id)?;
    tx.commit().await?;

    tracing::info!("Listing {} occupancy set to {:?}", listing.reference, status);
    Ok(listing)
}

/// Admin moderation decision
pub async fn moderate(store: &Store, id: i64, req: &ModerateListingRequest) -> Result<Listing> {
    let mut tx = store.begin().await?;
    let listing = found(ListingRepo::get(&mut tx, id).await?, "Listing", id)?;
    let reason = rules::moderate(listing.occupancy_status, req.status, req.reason.as_deref())?;
    ListingRepo::set_moderation(&mut tx, id, req.status, reason.as_deref()).await?;
    let listing = found(ListingRepo::get(&mut tx, id).await?, "Listing", id)?;
    tx.commit().await?;

    tracing::info!("Listing {} moderated: {}", listing.reference, req.status.as_str());
    Ok(listing)
}

pub async fn stats(store: &Store) -> Result<ListingStats> {
    let mut stats = ListingStats::default();
    for status in ModerationStatus::ALL {
        let count = store.count_listings_by_moderation(status).await?;
        match status {
            ModerationStatus::Pending => stats.pending = count,
            ModerationStatus::Validated => stats.validated = count,
            ModerationStatus::Rejected => stats.rejected = count,
        }
        stats.total += count;
    }
    Ok(stats)
}

/// Public search: validated listings only, rent bounds inclusive
pub async fn search(store: &Store, query: &ListingSearchQuery) -> Result<Vec<Listing>> {
    let listings = store
        .search_listings(query.city.as_deref(), query.property_type)
        .await?;
    Ok(listings
        .into_iter()
        .filter(|l| query.min_rent.map_or(true, |min| l.monthly_rent >= min))
        .filter(|l| query.max_rent.map_or(true, |max| l.monthly_rent <= max))
        .collect())
}

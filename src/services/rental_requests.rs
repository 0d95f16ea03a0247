use anyhow::Result;
use chrono::Utc;

use super::{ensure, Actor};
use crate::db::{found, ListingRepo, PersonRepo, RentalRequestRepo, Store};
use crate::models::*;
use crate::rules::{self, RuleViolation};

/// Tenant applies for a listing that is validated and free
pub async fn submit(store: &Store, actor: &Actor, req: &CreateRentalRequest) -> Result<RentalRequest> {
    req.check()?;

    let mut tx = store.begin().await?;
    let tenant = found(PersonRepo::get(&mut tx, actor.id).await?, "Person", actor.id)?;
    rules::ensure_tenant(&tenant)?;
    let listing = found(ListingRepo::get(&mut tx, req.listing_id).await?, "Listing", req.listing_id)?;
    rules::ensure_rentable(&listing)?;
    if RentalRequestRepo::has_pending(&mut tx, tenant.id, listing.id).await? {
        return Err(RuleViolation::DuplicatePendingRequest.into());
    }
    let request = RentalRequestRepo::create(&mut tx, tenant.id, req).await?;
    tx.commit().await?;

    tracing::info!("Rental request {} filed by {} for {}", request.id, tenant.email, listing.reference);
    Ok(request)
}

pub async fn accept(store: &Store, id: i64) -> Result<RentalRequest> {
    let mut tx = store.begin().await?;
    let request = found(RentalRequestRepo::get(&mut tx, id).await?, "Rental request", id)?;
    let listing = found(ListingRepo::get(&mut tx, request.listing_id).await?, "Listing", request.listing_id)?;
    rules::accept_request(request.status, listing.occupancy_status)?;
    let request = RentalRequestRepo::resolve(&mut tx, id, RequestStatus::Accepted, None, Utc::now()).await?;
    tx.commit().await?;

    tracing::info!("Rental request {} accepted for {}", id, listing.reference);
    Ok(request)
}

pub async fn refuse(store: &Store, id: i64, reason: Option<&str>) -> Result<RentalRequest> {
    let mut tx = store.begin().await?;
    let request = found(RentalRequestRepo::get(&mut tx, id).await?, "Rental request", id)?;
    let reason = rules::refuse_request(request.status, reason)?;
    let request =
        RentalRequestRepo::resolve(&mut tx, id, RequestStatus::Refused, Some(&reason), Utc::now()).await?;
    tx.commit().await?;

    tracing::info!("Rental request {} refused: {}", id, reason);
    Ok(request)
}

/// Visible to admins, the applicant and the listing owner
pub async fn get(store: &Store, actor: &Actor, id: i64) -> Result<RentalRequest> {
    let request = found(store.get_rental_request(id).await?, "Rental request", id)?;
    if !actor.owns(request.tenant_id) {
        let listing = found(store.get_listing(request.listing_id).await?, "Listing", request.listing_id)?;
        ensure(listing.owner_id == actor.id, "not a party to this rental request")?;
    }
    Ok(request)
}

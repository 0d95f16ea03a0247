use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};

use super::{ensure, Actor};
use crate::db::{found, LeaseRepo, ListingRepo, NewLease, PersonRepo, ReceiptRepo, RentalRequestRepo, Store};
use crate::models::*;
use crate::rules::{self, RuleViolation};
use crate::storage::{DocumentStore, LEASE_FOLDER, RECEIPT_FOLDER};

/// Sign a lease, either from an accepted rental request or for an explicit
/// (listing, tenant) pair. The listing becomes RENTED in the same transaction.
pub async fn create(store: &Store, req: &CreateLeaseRequest) -> Result<Lease> {
    req.check()?;
    rules::check_lease_dates(req.start_date, req.end_date)?;

    let mut tx = store.begin().await?;

    let (listing_id, tenant_id) = match req.rental_request_id {
        Some(request_id) => {
            let request = found(RentalRequestRepo::get(&mut tx, request_id).await?, "Rental request", request_id)?;
            if request.status != RequestStatus::Accepted {
                return Err(RuleViolation::RequestNotAccepted.into());
            }
            if req.listing_id.is_some_and(|id| id != request.listing_id)
                || req.tenant_id.is_some_and(|id| id != request.tenant_id)
            {
                return Err(RuleViolation::RequestMismatch.into());
            }
            if LeaseRepo::exists_for_request(&mut tx, request_id).await? {
                return Err(RuleViolation::RequestAlreadyLeased.into());
            }
            (request.listing_id, request.tenant_id)
        }
        None => match (req.listing_id, req.tenant_id) {
            (Some(listing_id), Some(tenant_id)) => (listing_id, tenant_id),
            _ => return Err(RuleViolation::MissingParties.into()),
        },
    };

    let tenant = found(PersonRepo::get(&mut tx, tenant_id).await?, "Person", tenant_id)?;
    rules::ensure_tenant(&tenant)?;
    let listing = found(ListingRepo::get(&mut tx, listing_id).await?, "Listing", listing_id)?;
    if LeaseRepo::active_for_listing(&mut tx, listing_id).await?.is_some() {
        return Err(RuleViolation::ActiveLeaseExists.into());
    }
    rules::ensure_rentable(&listing)?;

    let reference = LeaseRepo::next_reference(&mut tx, Utc::now().year()).await?;
    let lease = LeaseRepo::create(
        &mut tx,
        &NewLease {
            reference,
            listing_id,
            tenant_id,
            rental_request_id: req.rental_request_id,
            start_date: req.start_date,
            end_date: req.end_date,
            monthly_rent: req.monthly_rent.unwrap_or(listing.monthly_rent),
            charges: req.charges.unwrap_or(listing.charges),
            deposit: req.deposit.unwrap_or(listing.deposit),
            payment_day: req.payment_day,
            lease_type: req.lease_type,
            duration_months: rules::lease_months(req.start_date, req.end_date),
            signed_on: req.signed_on,
            special_clauses: req.special_clauses.clone(),
        },
    )
    .await?;
    ListingRepo::set_occupancy(&mut tx, listing_id, OccupancyStatus::Rented).await?;
    tx.commit().await?;

    tracing::info!(
        "Lease {} signed: listing {} to tenant {}",
        lease.reference,
        listing.reference,
        tenant.email
    );
    Ok(lease)
}

/// Admins, the tenant and the listing owner may see a lease
async fn ensure_party(store: &Store, actor: &Actor, lease: &Lease) -> Result<()> {
    if actor.owns(lease.tenant_id) {
        return Ok(());
    }
    let listing = found(store.get_listing(lease.listing_id).await?, "Listing", lease.listing_id)?;
    ensure(listing.owner_id == actor.id, "not a party to this lease")
}

pub async fn get(store: &Store, actor: &Actor, id: i64) -> Result<Lease> {
    let lease = found(store.get_lease(id).await?, "Lease", id)?;
    ensure_party(store, actor, &lease).await?;
    Ok(lease)
}

pub async fn get_by_reference(store: &Store, actor: &Actor, reference: &str) -> Result<Lease> {
    let lease = found(store.get_lease_by_reference(reference).await?, "Lease", reference)?;
    ensure_party(store, actor, &lease).await?;
    Ok(lease)
}

pub async fn list_by_tenant(store: &Store, actor: &Actor, tenant_id: i64) -> Result<Vec<Lease>> {
    ensure(actor.owns(tenant_id), "cannot list another tenant's leases")?;
    store.list_leases_by_tenant(tenant_id).await
}

pub async fn list_by_listing(store: &Store, actor: &Actor, listing_id: i64) -> Result<Vec<Lease>> {
    let listing = found(store.get_listing(listing_id).await?, "Listing", listing_id)?;
    ensure(actor.owns(listing.owner_id), "cannot list leases of another owner's listing")?;
    store.list_leases_by_listing(listing_id).await
}

pub async fn list_by_owner(store: &Store, actor: &Actor, owner_id: i64) -> Result<Vec<Lease>> {
    ensure(actor.owns(owner_id), "cannot list another owner's leases")?;
    store.list_leases_by_owner(owner_id).await
}

/// Amend the terms of an ACTIVE lease
pub async fn update(store: &Store, id: i64, req: &UpdateLeaseRequest) -> Result<Lease> {
    req.check()?;

    let mut tx = store.begin().await?;
    let mut lease = found(LeaseRepo::get(&mut tx, id).await?, "Lease", id)?;
    rules::ensure_lease_active(lease.status)?;

    if let Some(end_date) = req.end_date {
        rules::check_lease_dates(lease.start_date, end_date)?;
        lease.end_date = end_date;
        lease.duration_months = rules::lease_months(lease.start_date, end_date);
    }
    if let Some(v) = req.monthly_rent {
        lease.monthly_rent = v;
    }
    if let Some(v) = req.charges {
        lease.charges = v;
    }
    if req.payment_day.is_some() {
        lease.payment_day = req.payment_day;
    }
    if req.special_clauses.is_some() {
        lease.special_clauses = req.special_clauses.clone();
    }
    let lease = LeaseRepo::save_terms(&mut tx, &lease).await?;
    tx.commit().await?;

    tracing::info!("Lease {} amended", lease.reference);
    Ok(lease)
}

/// End an ACTIVE lease early and free its listing
pub async fn terminate(store: &Store, id: i64) -> Result<Lease> {
    let mut tx = store.begin().await?;
    let lease = found(LeaseRepo::get(&mut tx, id).await?, "Lease", id)?;
    rules::ensure_lease_active(lease.status)?;
    LeaseRepo::set_status(&mut tx, id, LeaseStatus::Terminated, Some(Utc::now())).await?;
    ListingRepo::set_occupancy(&mut tx, lease.listing_id, OccupancyStatus::Available).await?;
    let lease = found(LeaseRepo::get(&mut tx, id).await?, "Lease", id)?;
    tx.commit().await?;

    tracing::info!("Lease {} terminated", lease.reference);
    Ok(lease)
}

/// Expire every ACTIVE lease whose end date is before `today`
pub async fn expire_overdue(store: &Store, today: NaiveDate) -> Result<SweepReport> {
    let mut tx = store.begin().await?;
    let overdue = LeaseRepo::list_overdue(&mut tx, today).await?;
    let mut references = Vec::with_capacity(overdue.len());
    for lease in overdue {
        if !rules::is_expired(lease.status, lease.end_date, today) {
            continue;
        }
        LeaseRepo::set_status(&mut tx, lease.id, LeaseStatus::Expired, None).await?;
        ListingRepo::set_occupancy(&mut tx, lease.listing_id, OccupancyStatus::Available).await?;
        references.push(lease.reference);
    }
    tx.commit().await?;

    if !references.is_empty() {
        tracing::info!("Expired {} lease(s): {}", references.len(), references.join(", "));
    }
    Ok(SweepReport {
        expired: references.len(),
        references,
    })
}

/// Delete a lease with its payments, stored document and receipts
pub async fn delete(store: &Store, documents: &DocumentStore, receipts: &DocumentStore, id: i64) -> Result<()> {
    let mut tx = store.begin().await?;
    let lease = found(LeaseRepo::get(&mut tx, id).await?, "Lease", id)?;
    let receipt_files = ReceiptRepo::file_names_for_lease(&mut tx, id).await?;
    if lease.status == LeaseStatus::Active {
        ListingRepo::set_occupancy(&mut tx, lease.listing_id, OccupancyStatus::Available).await?;
    }
    LeaseRepo::delete(&mut tx, id).await?;
    tx.commit().await?;

    if let Some(doc) = &lease.document {
        let name = DocumentStore::file_name(&doc.uuid, "pdf");
        if let Err(e) = documents.remove(LEASE_FOLDER, &name).await {
            tracing::warn!("Failed to delete document of lease {}: {}", lease.reference, e);
        }
    }
    for name in receipt_files {
        if let Err(e) = receipts.remove(RECEIPT_FOLDER, &name).await {
            tracing::warn!("Failed to delete receipt {}: {}", name, e);
        }
    }

    tracing::info!("Lease {} deleted", lease.reference);
    Ok(())
}

fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Attach the signed PDF, replacing any previous one
pub async fn attach_document(
    store: &Store,
    documents: &DocumentStore,
    id: i64,
    file_name: &str,
    bytes: &[u8],
) -> Result<Lease> {
    if bytes.is_empty() {
        return Err(RuleViolation::MissingDocument.into());
    }
    if !is_pdf(bytes) {
        return Err(RuleViolation::NotPdf.into());
    }
    let previous = found(store.get_lease(id).await?, "Lease", id)?.document;

    let uuid = documents.put(LEASE_FOLDER, "pdf", bytes).await?;
    let document = LeaseDocument {
        uuid,
        name: file_name.to_string(),
        content_type: "application/pdf".to_string(),
        size: bytes.len() as i64,
    };

    let mut tx = store.begin().await?;
    let saved = LeaseRepo::set_document(&mut tx, id, Some(&document)).await;
    if let Err(e) = saved {
        let _ = documents.remove(LEASE_FOLDER, &DocumentStore::file_name(&document.uuid, "pdf")).await;
        return Err(e);
    }
    let lease = found(LeaseRepo::get(&mut tx, id).await?, "Lease", id)?;
    tx.commit().await?;

    if let Some(old) = previous {
        if let Err(e) = documents.remove(LEASE_FOLDER, &DocumentStore::file_name(&old.uuid, "pdf")).await {
            tracing::warn!("Failed to delete replaced document {}: {}", old.uuid, e);
        }
    }
    tracing::info!("Document {} attached to lease {}", document.name, lease.reference);
    Ok(lease)
}

/// Open the lease PDF for streaming
pub async fn open_document(
    store: &Store,
    documents: &DocumentStore,
    actor: &Actor,
    id: i64,
) -> Result<(LeaseDocument, tokio::fs::File)> {
    let lease = get(store, actor, id).await?;
    let document = found(lease.document, "Lease document", id)?;
    let file = documents
        .open(LEASE_FOLDER, &DocumentStore::file_name(&document.uuid, "pdf"))
        .await?;
    let file = found(file, "Lease document", &document.uuid)?;
    Ok((document, file))
}

use anyhow::Result;
use chrono::{NaiveDate, Utc};

use super::{ensure, Actor};
use crate::db::{found, LeaseRepo, ListingRepo, NewPayment, PaymentRepo, PersonRepo, ReceiptRepo, Store};
use crate::models::*;
use crate::receipts::{self, ReceiptData};
use crate::rules::{self, Initiation, RuleViolation};
use crate::storage::{DocumentStore, RECEIPT_FOLDER};

/// Payment settings taken from configuration
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub currency: String,
    pub cancel_grace_hours: i64,
}

fn generate_transaction_ref() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("TXN-{}", token[..12].to_uppercase())
}

/// Open (or reuse) the payment of one month of an ACTIVE lease. The amount
/// is the lease's current rent plus charges.
pub async fn initiate(
    store: &Store,
    policy: &PaymentPolicy,
    actor: &Actor,
    req: &InitiatePaymentRequest,
    today: NaiveDate,
) -> Result<Payment> {
    let month = match req.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(month) => rules::parse_month(month)?,
        None => rules::month_start(today),
    };

    let mut tx = store.begin().await?;
    let lease = found(LeaseRepo::get(&mut tx, req.lease_id).await?, "Lease", req.lease_id)?;
    ensure(actor.owns(lease.tenant_id), "only the lease tenant can pay this lease")?;
    rules::ensure_lease_active(lease.status)?;
    rules::ensure_month_within_lease(month, lease.start_date, lease.end_date)?;

    let terms = NewPayment {
        lease_id: lease.id,
        tenant_id: lease.tenant_id,
        rent_amount: lease.monthly_rent,
        charges_amount: lease.charges,
        month,
        due_date: rules::due_date(month, lease.payment_day),
        currency: policy.currency.clone(),
    };

    let payment = match PaymentRepo::get_for_month(&mut tx, lease.id, month).await? {
        Some(existing) => match rules::initiate_over(existing.status)? {
            Initiation::Reuse => existing,
            Initiation::Reopen => {
                tracing::info!("Reopening payment {} for {}", existing.reference, month.format("%Y-%m"));
                PaymentRepo::reopen(&mut tx, existing.id, &terms).await?
            }
        },
        None => {
            let reference = PaymentRepo::next_reference(&mut tx).await?;
            let payment = PaymentRepo::create(&mut tx, &reference, &terms).await?;
            tracing::info!(
                "Payment {} opened for lease {} ({}): {} {}",
                payment.reference,
                lease.reference,
                month.format("%Y-%m"),
                payment.total_amount,
                payment.currency
            );
            payment
        }
    };
    tx.commit().await?;
    Ok(payment)
}

/// PENDING to CAPTURED for a still ACTIVE lease
pub async fn capture(store: &Store, actor: &Actor, id: i64, req: &CapturePaymentRequest) -> Result<Payment> {
    let mut tx = store.begin().await?;
    let payment = found(PaymentRepo::get(&mut tx, id).await?, "Payment", id)?;
    ensure(actor.owns(payment.tenant_id), "only the lease tenant can pay this lease")?;
    let lease = found(LeaseRepo::get(&mut tx, payment.lease_id).await?, "Lease", payment.lease_id)?;
    rules::ensure_capturable(payment.status, lease.status)?;

    let transaction_ref = req
        .transaction_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_transaction_ref);
    let method = req.payment_method.as_deref().map(str::trim).filter(|m| !m.is_empty());

    if !PaymentRepo::capture(&mut tx, id, &transaction_ref, method, Utc::now()).await? {
        // lost a race with another capture of the same payment
        return Err(RuleViolation::AlreadyPaid.into());
    }
    let payment = found(PaymentRepo::get(&mut tx, id).await?, "Payment", id)?;
    tx.commit().await?;

    tracing::info!("Payment {} captured ({})", payment.reference, transaction_ref);
    Ok(payment)
}

pub async fn fail(store: &Store, id: i64, reason: Option<&str>) -> Result<Payment> {
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("payment failed");

    let mut tx = store.begin().await?;
    let payment = found(PaymentRepo::get(&mut tx, id).await?, "Payment", id)?;
    rules::ensure_failable(payment.status)?;
    if !PaymentRepo::fail(&mut tx, id, reason).await? {
        return Err(RuleViolation::PaymentNotPending.into());
    }
    let payment = found(PaymentRepo::get(&mut tx, id).await?, "Payment", id)?;
    tx.commit().await?;

    tracing::info!("Payment {} failed: {}", payment.reference, reason);
    Ok(payment)
}

/// Cancel a pending payment, or reverse a capture inside the grace window.
/// A reversed capture loses its receipt.
pub async fn cancel(store: &Store, policy: &PaymentPolicy, receipts_dir: &DocumentStore, id: i64) -> Result<Payment> {
    let now = Utc::now();

    let mut tx = store.begin().await?;
    let payment = found(PaymentRepo::get(&mut tx, id).await?, "Payment", id)?;
    rules::ensure_cancellable(payment.status, payment.captured_at, now, policy.cancel_grace_hours)?;
    if !PaymentRepo::cancel(&mut tx, id, now).await? {
        return Err(RuleViolation::PaymentNotPending.into());
    }
    let stale_receipt = ReceiptRepo::delete_by_payment(&mut tx, id).await?;
    let payment = found(PaymentRepo::get(&mut tx, id).await?, "Payment", id)?;
    tx.commit().await?;

    if let Some(name) = stale_receipt {
        if let Err(e) = receipts_dir.remove(RECEIPT_FOLDER, &name).await {
            tracing::warn!("Failed to delete receipt {}: {:#}", name, e);
        }
    }

    tracing::info!("Payment {} cancelled", payment.reference);
    Ok(payment)
}

/// Admins, the paying tenant and the listing owner may see a payment
async fn ensure_party(store: &Store, actor: &Actor, lease: &Lease) -> Result<()> {
    if actor.owns(lease.tenant_id) {
        return Ok(());
    }
    let listing = found(store.get_listing(lease.listing_id).await?, "Listing", lease.listing_id)?;
    ensure(listing.owner_id == actor.id, "not a party to this payment")
}

pub async fn get(store: &Store, actor: &Actor, id: i64) -> Result<Payment> {
    let payment = found(store.get_payment(id).await?, "Payment", id)?;
    let lease = found(store.get_lease(payment.lease_id).await?, "Lease", payment.lease_id)?;
    ensure_party(store, actor, &lease).await?;
    Ok(payment)
}

pub async fn list_by_lease(store: &Store, actor: &Actor, lease_id: i64) -> Result<Vec<Payment>> {
    let lease = found(store.get_lease(lease_id).await?, "Lease", lease_id)?;
    ensure_party(store, actor, &lease).await?;
    store.list_payments_by_lease(lease_id).await
}

/// PDF receipt of a captured payment, rendered once and cached on disk
pub async fn receipt(store: &Store, receipts_dir: &DocumentStore, actor: &Actor, id: i64) -> Result<(String, Vec<u8>)> {
    let payment = get(store, actor, id).await?;
    if payment.status != PaymentStatus::Captured {
        return Err(RuleViolation::PaymentNotCaptured.into());
    }

    let name = receipts::file_name(&payment);
    if let Some(issued) = store.get_receipt(payment.id).await? {
        // a receipt older than the capture belongs to a reversed one
        let current = payment.captured_at.map_or(true, |at| issued.issued_at >= at);
        if current {
            if let Some(bytes) = receipts_dir.read(RECEIPT_FOLDER, &name).await? {
                return Ok((name, bytes));
            }
            tracing::warn!("Receipt file {} missing, rendering it again", name);
        }
    }

    let mut tx = store.begin().await?;
    let lease = found(LeaseRepo::get(&mut tx, payment.lease_id).await?, "Lease", payment.lease_id)?;
    let listing = found(ListingRepo::get(&mut tx, lease.listing_id).await?, "Listing", lease.listing_id)?;
    let tenant = found(PersonRepo::get(&mut tx, lease.tenant_id).await?, "Person", lease.tenant_id)?;
    let landlord = found(PersonRepo::get(&mut tx, listing.owner_id).await?, "Person", listing.owner_id)?;

    let bytes = receipts::render(&ReceiptData {
        payment: &payment,
        lease: &lease,
        listing: &listing,
        tenant: &tenant,
        landlord: &landlord,
    })?;
    receipts_dir.write(RECEIPT_FOLDER, &name, &bytes).await?;
    ReceiptRepo::upsert(&mut tx, payment.id, &name).await?;
    tx.commit().await?;

    tracing::info!("Receipt {} issued", name);
    Ok((name, bytes))
}

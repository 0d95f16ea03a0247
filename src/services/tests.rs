use chrono::{Duration, Months, NaiveDate, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use super::*;
use crate::db::{NewPerson, PersonRepo, Store};
use crate::models::*;
use crate::rules::{month_start, RuleViolation};
use crate::storage::DocumentStore;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn policy() -> payments::PaymentPolicy {
    payments::PaymentPolicy {
        currency: "MAD".to_string(),
        cancel_grace_hours: 48,
    }
}

fn violation(err: anyhow::Error) -> RuleViolation {
    match err.downcast::<RuleViolation>() {
        Ok(v) => v,
        Err(other) => panic!("expected a rule violation, got: {other:#}"),
    }
}

async fn person(store: &Store, name: &str, role: Role, verified: bool) -> Actor {
    let mut tx = store.begin().await.unwrap();
    let person = PersonRepo::create(
        &mut tx,
        &NewPerson {
            first_name: name.to_string(),
            last_name: "Test".to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            address: None,
            role,
            verified,
            owner_request: false,
            password_hash: "x".to_string(),
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    Actor::new(person.id, role)
}

fn listing_request() -> CreateListingRequest {
    serde_json::from_value(json!({
        "property_type": "APARTMENT",
        "address": "12 Rue Atlas",
        "city": "Rabat",
        "postal_code": "10000",
        "surface": 85.0,
        "rooms": 3,
        "monthly_rent": "4500.00",
        "charges": "300.00",
        "deposit": "9000.00"
    }))
    .unwrap()
}

struct World {
    store: Store,
    admin: Actor,
    landlord: Actor,
    tenant: Actor,
}

async fn world() -> World {
    let store = Store::in_memory().await.unwrap();
    let admin = person(&store, "Admin", Role::Admin, true).await;
    let landlord = person(&store, "Omar", Role::Landlord, true).await;
    let tenant = person(&store, "Sara", Role::Tenant, false).await;
    World { store, admin, landlord, tenant }
}

/// A validated, available listing owned by the world's landlord
async fn validated_listing(w: &World) -> Listing {
    let listing = listings::create(&w.store, &w.landlord, &listing_request()).await.unwrap();
    let req = ModerateListingRequest { status: ModerationStatus::Validated, reason: None };
    listings::moderate(&w.store, listing.id, &req).await.unwrap()
}

fn lease_request(listing_id: i64, tenant_id: i64, start: NaiveDate, end: NaiveDate) -> CreateLeaseRequest {
    serde_json::from_value(json!({
        "listing_id": listing_id,
        "tenant_id": tenant_id,
        "start_date": start,
        "end_date": end,
        "payment_day": 5,
        "lease_type": "UNFURNISHED"
    }))
    .unwrap()
}

/// A one-year lease covering the current month
async fn active_lease(w: &World, listing: &Listing, tenant: &Actor) -> Lease {
    let start = month_start(today());
    let end = start + Months::new(12) - Duration::days(1);
    leases::create(&w.store, &lease_request(listing.id, tenant.id, start, end)).await.unwrap()
}

async fn listing_state(store: &Store, id: i64) -> Listing {
    store.get_listing(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_listing_to_payment_scenario() {
    let w = world().await;
    let receipts_dir = tempfile::tempdir().unwrap();
    let receipts_store = DocumentStore::new(receipts_dir.path());

    let listing = listings::create(&w.store, &w.landlord, &listing_request()).await.unwrap();
    assert_eq!(listing.moderation_status, ModerationStatus::Pending);
    assert_eq!(listing.occupancy_status, OccupancyStatus::Available);
    assert!(listing.reference.starts_with("LST-APT-"));

    let req = ModerateListingRequest { status: ModerationStatus::Validated, reason: None };
    let listing = listings::moderate(&w.store, listing.id, &req).await.unwrap();
    assert_eq!(listing.moderation_status, ModerationStatus::Validated);

    let request = rental_requests::submit(
        &w.store,
        &w.tenant,
        &CreateRentalRequest {
            listing_id: listing.id,
            desired_start: today() + Duration::days(30),
            duration_months: 12,
            message: Some("Available from next month".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    let request = rental_requests::accept(&w.store, request.id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Accepted);
    assert!(request.processed_at.is_some());

    let start = month_start(today());
    let end = start + Months::new(12) - Duration::days(1);
    let mut lease_req = lease_request(listing.id, w.tenant.id, start, end);
    lease_req.rental_request_id = Some(request.id);
    lease_req.listing_id = None;
    lease_req.tenant_id = None;
    let lease = leases::create(&w.store, &lease_req).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Active);
    assert_eq!(lease.tenant_id, w.tenant.id);
    assert_eq!(lease.monthly_rent, dec!(4500.00));
    assert_eq!(lease.duration_months, 12);
    assert!(lease.reference.starts_with("CTR-"));
    assert_eq!(listing_state(&w.store, listing.id).await.occupancy_status, OccupancyStatus::Rented);

    let initiate = InitiatePaymentRequest { lease_id: lease.id, month: None };
    let payment = payments::initiate(&w.store, &policy(), &w.tenant, &initiate, today()).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.total_amount, dec!(4800.00));
    assert_eq!(payment.month, month_start(today()));
    assert!(payment.reference.starts_with("PAY-"));

    // initiating the same month again reuses the pending row
    let again = payments::initiate(&w.store, &policy(), &w.tenant, &initiate, today()).await.unwrap();
    assert_eq!(again.id, payment.id);

    let captured = payments::capture(&w.store, &w.tenant, payment.id, &CapturePaymentRequest::default())
        .await
        .unwrap();
    assert_eq!(captured.status, PaymentStatus::Captured);
    assert!(captured.captured_at.is_some());
    assert!(captured.transaction_ref.as_deref().unwrap().starts_with("TXN-"));

    let err = payments::capture(&w.store, &w.tenant, payment.id, &CapturePaymentRequest::default())
        .await
        .unwrap_err();
    let err = violation(err);
    assert_eq!(err, RuleViolation::AlreadyPaid);
    assert!(err.to_string().contains("already paid"));

    let err = payments::initiate(&w.store, &policy(), &w.tenant, &initiate, today()).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::AlreadyPaid);

    let (name, bytes) = payments::receipt(&w.store, &receipts_store, &w.landlord, payment.id).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert!(w.store.get_receipt(payment.id).await.unwrap().is_some());
    let (cached_name, cached) = payments::receipt(&w.store, &receipts_store, &w.tenant, payment.id).await.unwrap();
    assert_eq!(cached_name, name);
    assert_eq!(cached, bytes);
}

#[tokio::test]
async fn test_rejection_and_refusal_need_reason() {
    let w = world().await;
    let listing = listings::create(&w.store, &w.landlord, &listing_request()).await.unwrap();

    let req = ModerateListingRequest { status: ModerationStatus::Rejected, reason: Some("  ".to_string()) };
    let err = listings::moderate(&w.store, listing.id, &req).await.unwrap_err();
    assert!(matches!(violation(err), RuleViolation::ReasonRequired { .. }));

    let req = ModerateListingRequest { status: ModerationStatus::Rejected, reason: Some("No photos".to_string()) };
    let rejected = listings::moderate(&w.store, listing.id, &req).await.unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("No photos"));

    // validating clears the reason
    let req = ModerateListingRequest { status: ModerationStatus::Validated, reason: None };
    let validated = listings::moderate(&w.store, listing.id, &req).await.unwrap();
    assert!(validated.rejection_reason.is_none());

    let request = rental_requests::submit(
        &w.store,
        &w.tenant,
        &CreateRentalRequest {
            listing_id: listing.id,
            desired_start: today() + Duration::days(10),
            duration_months: 6,
            message: None,
        },
    )
    .await
    .unwrap();
    let err = rental_requests::refuse(&w.store, request.id, None).await.unwrap_err();
    assert!(matches!(violation(err), RuleViolation::ReasonRequired { .. }));

    let refused = rental_requests::refuse(&w.store, request.id, Some("Income too low")).await.unwrap();
    assert_eq!(refused.status, RequestStatus::Refused);
    assert_eq!(refused.refusal_reason.as_deref(), Some("Income too low"));

    // resolved requests are immutable
    let err = rental_requests::accept(&w.store, request.id).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::RequestAlreadyProcessed);
}

#[tokio::test]
async fn test_one_pending_request_per_pair() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    let req = CreateRentalRequest {
        listing_id: listing.id,
        desired_start: today() + Duration::days(15),
        duration_months: 12,
        message: None,
    };
    rental_requests::submit(&w.store, &w.tenant, &req).await.unwrap();
    let err = rental_requests::submit(&w.store, &w.tenant, &req).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::DuplicatePendingRequest);

    // a landlord cannot apply
    let err = rental_requests::submit(&w.store, &w.landlord, &req).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::NotATenant);
}

#[tokio::test]
async fn test_requests_need_validated_available_listing() {
    let w = world().await;
    let pending = listings::create(&w.store, &w.landlord, &listing_request()).await.unwrap();
    let req = CreateRentalRequest {
        listing_id: pending.id,
        desired_start: today() + Duration::days(15),
        duration_months: 12,
        message: None,
    };
    let err = rental_requests::submit(&w.store, &w.tenant, &req).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::ListingNotValidated);
}

#[tokio::test]
async fn test_at_most_one_active_lease_per_listing() {
    let w = world().await;
    let other_tenant = person(&w.store, "Yassine", Role::Tenant, false).await;
    let listing = validated_listing(&w).await;

    active_lease(&w, &listing, &w.tenant).await;
    let start = month_start(today());
    let err = leases::create(&w.store, &lease_request(listing.id, other_tenant.id, start, start + Months::new(6)))
        .await
        .unwrap_err();
    assert_eq!(violation(err), RuleViolation::ActiveLeaseExists);

    let active = w.store.list_leases_by_status(LeaseStatus::Active).await.unwrap();
    assert_eq!(active.iter().filter(|l| l.listing_id == listing.id).count(), 1);
}

#[tokio::test]
async fn test_lease_creation_guards() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    let start = month_start(today());

    let err = leases::create(&w.store, &lease_request(listing.id, w.tenant.id, start, start)).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::InvalidLeaseDates);

    let err = leases::create(&w.store, &lease_request(listing.id, w.landlord.id, start, start + Months::new(12)))
        .await
        .unwrap_err();
    assert_eq!(violation(err), RuleViolation::NotATenant);

    let pending = listings::create(&w.store, &w.landlord, &listing_request()).await.unwrap();
    let err = leases::create(&w.store, &lease_request(pending.id, w.tenant.id, start, start + Months::new(12)))
        .await
        .unwrap_err();
    assert_eq!(violation(err), RuleViolation::ListingNotValidated);

    // a pending request cannot seed a lease
    let request = rental_requests::submit(
        &w.store,
        &w.tenant,
        &CreateRentalRequest {
            listing_id: listing.id,
            desired_start: today() + Duration::days(5),
            duration_months: 12,
            message: None,
        },
    )
    .await
    .unwrap();
    let mut req = lease_request(listing.id, w.tenant.id, start, start + Months::new(12));
    req.rental_request_id = Some(request.id);
    let err = leases::create(&w.store, &req).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::RequestNotAccepted);
}

#[tokio::test]
async fn test_terminate_frees_listing() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    let lease = active_lease(&w, &listing, &w.tenant).await;

    // occupancy cannot be released by hand under an active lease
    let err = listings::set_occupancy(&w.store, listing.id, OccupancyStatus::Available).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::ActiveLeaseExists);
    let err = listings::delete(&w.store, &w.landlord, listing.id).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::ActiveLeaseExists);

    let terminated = leases::terminate(&w.store, lease.id).await.unwrap();
    assert_eq!(terminated.status, LeaseStatus::Terminated);
    assert!(terminated.terminated_at.is_some());
    assert_eq!(listing_state(&w.store, listing.id).await.occupancy_status, OccupancyStatus::Available);

    let err = leases::terminate(&w.store, lease.id).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::LeaseNotActive);

    // history keeps the listing from being deleted
    let err = listings::delete(&w.store, &w.landlord, listing.id).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::ListingHasLeases);
}

#[tokio::test]
async fn test_expire_sweep() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    let start = today() - Duration::days(90);
    let end = today() - Duration::days(1);
    let lease = leases::create(&w.store, &lease_request(listing.id, w.tenant.id, start, end)).await.unwrap();

    let report = leases::expire_overdue(&w.store, today()).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.references, vec![lease.reference.clone()]);

    let lease = w.store.get_lease(lease.id).await.unwrap().unwrap();
    assert_eq!(lease.status, LeaseStatus::Expired);
    assert_eq!(listing_state(&w.store, listing.id).await.occupancy_status, OccupancyStatus::Available);

    let report = leases::expire_overdue(&w.store, today()).await.unwrap();
    assert_eq!(report.expired, 0);
}

#[tokio::test]
async fn test_rented_requires_validated() {
    let w = world().await;
    let listing = listings::create(&w.store, &w.landlord, &listing_request()).await.unwrap();
    let err = listings::set_occupancy(&w.store, listing.id, OccupancyStatus::Rented).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::RentedRequiresValidated);

    let mut req = listing_request();
    req.occupancy_status = Some(OccupancyStatus::Rented);
    let err = listings::create(&w.store, &w.landlord, &req).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::RentedRequiresValidated);

    // a rented listing cannot be moved out of VALIDATED
    let validated = validated_listing(&w).await;
    active_lease(&w, &validated, &w.tenant).await;
    let req = ModerateListingRequest { status: ModerationStatus::Rejected, reason: Some("late".to_string()) };
    let err = listings::moderate(&w.store, validated.id, &req).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::ListingRented);

    let all = w.store.list_listings().await.unwrap();
    assert!(all
        .iter()
        .all(|l| l.occupancy_status != OccupancyStatus::Rented || l.moderation_status == ModerationStatus::Validated));
}

#[tokio::test]
async fn test_listing_owner_rules() {
    let w = world().await;
    let unverified = person(&w.store, "Karim", Role::Landlord, false).await;
    let err = listings::create(&w.store, &unverified, &listing_request()).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::LandlordNotVerified);

    let err = listings::create(&w.store, &w.tenant, &listing_request()).await.unwrap_err();
    assert!(err.downcast_ref::<AccessDenied>().is_some());

    // admins must name the owner
    let err = listings::create(&w.store, &w.admin, &listing_request()).await.unwrap_err();
    assert!(err.downcast_ref::<validator::ValidationErrors>().is_some());
    let mut req = listing_request();
    req.owner_id = Some(w.landlord.id);
    let listing = listings::create(&w.store, &w.admin, &req).await.unwrap();
    assert_eq!(listing.owner_id, w.landlord.id);

    let other = person(&w.store, "Nadia", Role::Landlord, true).await;
    let update = UpdateListingRequest { city: Some("Tanger".to_string()), ..Default::default() };
    let err = listings::update(&w.store, &other, listing.id, &update).await.unwrap_err();
    assert!(err.downcast_ref::<AccessDenied>().is_some());
    let updated = listings::update(&w.store, &w.landlord, listing.id, &update).await.unwrap();
    assert_eq!(updated.city, "Tanger");
}

#[tokio::test]
async fn test_search_filters() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    listings::create(&w.store, &w.landlord, &listing_request()).await.unwrap();

    let query = ListingSearchQuery { city: Some("rabat".to_string()), ..Default::default() };
    let found = listings::search(&w.store, &query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, listing.id);

    let query = ListingSearchQuery { max_rent: Some(dec!(4000)), ..Default::default() };
    assert!(listings::search(&w.store, &query).await.unwrap().is_empty());

    let query = ListingSearchQuery {
        property_type: Some(PropertyType::Apartment),
        min_rent: Some(dec!(4500)),
        ..Default::default()
    };
    assert_eq!(listings::search(&w.store, &query).await.unwrap().len(), 1);

    let stats = listings::stats(&w.store).await.unwrap();
    assert_eq!((stats.total, stats.pending, stats.validated), (2, 1, 1));
}

#[tokio::test]
async fn test_payment_month_and_reopen() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    let lease = active_lease(&w, &listing, &w.tenant).await;

    let outside = (month_start(today()) - Months::new(1)).format("%Y-%m").to_string();
    let req = InitiatePaymentRequest { lease_id: lease.id, month: Some(outside) };
    let err = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap_err();
    assert!(matches!(violation(err), RuleViolation::MonthOutsideLease(_)));

    let next = (month_start(today()) + Months::new(1)).format("%Y-%m").to_string();
    let req = InitiatePaymentRequest { lease_id: lease.id, month: Some(next) };
    let payment = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap();
    assert_eq!(payment.due_date.map(|d| d.format("%d").to_string()), Some("05".to_string()));

    let failed = payments::fail(&w.store, payment.id, Some("card declined")).await.unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);

    let reopened = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap();
    assert_eq!(reopened.id, payment.id);
    assert_eq!(reopened.status, PaymentStatus::Pending);
    assert!(reopened.failure_reason.is_none());
}

#[tokio::test]
async fn test_cancel_capture_within_grace() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    let lease = active_lease(&w, &listing, &w.tenant).await;
    let req = InitiatePaymentRequest { lease_id: lease.id, month: None };
    let payment = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap();

    // only the lease tenant (or an admin) can pay
    let stranger = person(&w.store, "Hamza", Role::Tenant, false).await;
    let err = payments::capture(&w.store, &stranger, payment.id, &CapturePaymentRequest::default())
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<AccessDenied>().is_some());

    let receipts_dir = tempfile::tempdir().unwrap();
    let receipts_store = DocumentStore::new(receipts_dir.path());
    payments::capture(&w.store, &w.admin, payment.id, &CapturePaymentRequest::default()).await.unwrap();
    let cancelled = payments::cancel(&w.store, &policy(), &receipts_store, payment.id).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let err = payments::cancel(&w.store, &policy(), &receipts_store, payment.id).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::PaymentNotPending);

    let reopened = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap();
    assert_eq!(reopened.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_reversed_capture_gets_a_fresh_receipt() {
    let w = world().await;
    let receipts_dir = tempfile::tempdir().unwrap();
    let receipts_store = DocumentStore::new(receipts_dir.path());
    let listing = validated_listing(&w).await;
    let lease = active_lease(&w, &listing, &w.tenant).await;
    let req = InitiatePaymentRequest { lease_id: lease.id, month: None };
    let payment = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap();

    let first = CapturePaymentRequest {
        transaction_ref: Some("TXN-FIRST".to_string()),
        payment_method: None,
    };
    payments::capture(&w.store, &w.tenant, payment.id, &first).await.unwrap();
    let (name, _) = payments::receipt(&w.store, &receipts_store, &w.tenant, payment.id).await.unwrap();
    assert!(receipts_dir.path().join(crate::storage::RECEIPT_FOLDER).join(&name).exists());

    payments::cancel(&w.store, &policy(), &receipts_store, payment.id).await.unwrap();
    assert!(w.store.get_receipt(payment.id).await.unwrap().is_none());
    assert!(!receipts_dir.path().join(crate::storage::RECEIPT_FOLDER).join(&name).exists());
    let err = payments::receipt(&w.store, &receipts_store, &w.tenant, payment.id).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::PaymentNotCaptured);

    let update: UpdateLeaseRequest = serde_json::from_value(json!({"monthly_rent": "9999.00"})).unwrap();
    leases::update(&w.store, lease.id, &update).await.unwrap();
    let reopened = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap();
    assert_eq!(reopened.id, payment.id);
    assert_eq!(reopened.total_amount, dec!(10299.00));

    let second = CapturePaymentRequest {
        transaction_ref: Some("TXN-SECOND".to_string()),
        payment_method: None,
    };
    let recaptured = payments::capture(&w.store, &w.tenant, payment.id, &second).await.unwrap();
    assert_eq!(recaptured.transaction_ref.as_deref(), Some("TXN-SECOND"));

    let (again, bytes) = payments::receipt(&w.store, &receipts_store, &w.tenant, payment.id).await.unwrap();
    assert_eq!(again, name);
    assert!(bytes.starts_with(b"%PDF"));
    let issued = w.store.get_receipt(payment.id).await.unwrap().unwrap();
    assert!(issued.issued_at >= recaptured.captured_at.unwrap());
}

/// World on a pooled, file-backed database, as the server runs it
async fn file_world(dir: &tempfile::TempDir) -> World {
    let path = dir.path().join("rental-hub.db");
    let store = Store::with_pool_size(path.to_str().unwrap(), 5).await.unwrap();
    let admin = person(&store, "Admin", Role::Admin, true).await;
    let landlord = person(&store, "Omar", Role::Landlord, true).await;
    let tenant = person(&store, "Sara", Role::Tenant, false).await;
    World { store, admin, landlord, tenant }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_captures_resolve_as_rule_errors() {
    let dir = tempfile::tempdir().unwrap();
    let w = file_world(&dir).await;
    let listing = validated_listing(&w).await;
    let lease = active_lease(&w, &listing, &w.tenant).await;

    for offset in 0..6 {
        let month = (month_start(today()) + Months::new(offset)).format("%Y-%m").to_string();
        let req = InitiatePaymentRequest { lease_id: lease.id, month: Some(month) };
        let payment_id = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap().id;

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let store = w.store.clone();
                let tenant = w.tenant;
                tokio::spawn(async move {
                    payments::capture(&store, &tenant, payment_id, &CapturePaymentRequest::default()).await
                })
            })
            .collect();

        let mut captured = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => captured += 1,
                Err(err) => assert_eq!(violation(err), RuleViolation::AlreadyPaid),
            }
        }
        assert_eq!(captured, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_listing_creation() {
    let dir = tempfile::tempdir().unwrap();
    let w = file_world(&dir).await;

    let creations: Vec<_> = (0..10)
        .map(|_| {
            let store = w.store.clone();
            let landlord = w.landlord;
            tokio::spawn(async move { listings::create(&store, &landlord, &listing_request()).await })
        })
        .collect();

    let mut references = std::collections::HashSet::new();
    for creation in creations {
        let listing = creation.await.unwrap().unwrap();
        references.insert(listing.reference);
    }
    assert_eq!(references.len(), 10);
    assert_eq!(w.store.list_listings().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_abandoned_transaction_rolls_back() {
    let w = world().await;
    {
        let mut tx = w.store.begin().await.unwrap();
        PersonRepo::create(
            &mut tx,
            &NewPerson {
                first_name: "Ghost".to_string(),
                last_name: "Test".to_string(),
                email: "ghost@example.com".to_string(),
                phone: None,
                address: None,
                role: Role::Tenant,
                verified: false,
                owner_request: false,
                password_hash: "x".to_string(),
            },
        )
        .await
        .unwrap();
    }
    assert!(w.store.get_person_by_email("ghost@example.com").await.unwrap().is_none());
    // the connection went back to the pool usable
    person(&w.store, "Nadia", Role::Tenant, false).await;
}

#[tokio::test]
async fn test_capture_requires_active_lease() {
    let w = world().await;
    let listing = validated_listing(&w).await;
    let lease = active_lease(&w, &listing, &w.tenant).await;
    let req = InitiatePaymentRequest { lease_id: lease.id, month: None };
    let payment = payments::initiate(&w.store, &policy(), &w.tenant, &req, today()).await.unwrap();

    leases::terminate(&w.store, lease.id).await.unwrap();
    let err = payments::capture(&w.store, &w.tenant, payment.id, &CapturePaymentRequest::default())
        .await
        .unwrap_err();
    assert_eq!(violation(err), RuleViolation::LeaseNotActive);
}

#[tokio::test]
async fn test_lease_document_lifecycle() {
    let w = world().await;
    let docs_dir = tempfile::tempdir().unwrap();
    let receipts_dir = tempfile::tempdir().unwrap();
    let documents = DocumentStore::new(docs_dir.path());
    let receipts_store = DocumentStore::new(receipts_dir.path());
    let listing = validated_listing(&w).await;
    let lease = active_lease(&w, &listing, &w.tenant).await;

    let err = leases::attach_document(&w.store, &documents, lease.id, "lease.txt", b"plain text")
        .await
        .unwrap_err();
    assert_eq!(violation(err), RuleViolation::NotPdf);

    let lease = leases::attach_document(&w.store, &documents, lease.id, "lease.pdf", b"%PDF-1.7 signed")
        .await
        .unwrap();
    let doc = lease.document.clone().unwrap();
    assert_eq!(doc.name, "lease.pdf");
    assert_eq!(doc.size, 15);

    let (meta, _file) = leases::open_document(&w.store, &documents, &w.landlord, lease.id).await.unwrap();
    assert_eq!(meta.uuid, doc.uuid);
    let stranger = person(&w.store, "Hamza", Role::Tenant, false).await;
    let err = leases::open_document(&w.store, &documents, &stranger, lease.id).await.unwrap_err();
    assert!(err.downcast_ref::<AccessDenied>().is_some());

    leases::delete(&w.store, &documents, &receipts_store, lease.id).await.unwrap();
    assert!(w.store.get_lease(lease.id).await.unwrap().is_none());
    let stored = DocumentStore::file_name(&doc.uuid, "pdf");
    assert!(documents.read(crate::storage::LEASE_FOLDER, &stored).await.unwrap().is_none());
    assert_eq!(listing_state(&w.store, listing.id).await.occupancy_status, OccupancyStatus::Available);
}

#[tokio::test]
async fn test_registration_and_owner_approval() {
    let store = Store::in_memory().await.unwrap();

    let register = |email: &str, role: Option<Role>| RegisterRequest {
        first_name: "Leila".to_string(),
        last_name: "Bennani".to_string(),
        email: email.to_string(),
        phone: None,
        password: "s3cret-pass".to_string(),
        role,
    };

    let err = persons::register(&store, &register("root@example.com", Some(Role::Admin))).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::AdminRegistrationRefused);

    let landlord = persons::register(&store, &register("Leila@Example.com", Some(Role::Landlord))).await.unwrap();
    assert_eq!(landlord.email, "leila@example.com");
    assert!(!landlord.verified);
    assert!(landlord.owner_request);

    let err = persons::register(&store, &register("leila@example.com", None)).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::EmailTaken);

    assert!(persons::authenticate(&store, "leila@example.com", "s3cret-pass").await.unwrap().is_some());
    assert!(persons::authenticate(&store, "leila@example.com", "wrong").await.unwrap().is_none());

    let pending = store.list_owner_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    let approved = persons::approve_owner(&store, landlord.id).await.unwrap();
    assert_eq!(approved.role, Role::Landlord);
    assert!(approved.verified);
    assert!(!approved.owner_request);

    let err = persons::approve_owner(&store, landlord.id).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::NoOwnerRequest);

    let tenant = persons::register(&store, &register("tenant@example.com", None)).await.unwrap();
    assert_eq!(tenant.role, Role::Tenant);
    let asked = persons::request_owner(&store, tenant.id).await.unwrap();
    assert!(asked.owner_request);
    let rejected = persons::reject_owner(&store, tenant.id).await.unwrap();
    assert!(!rejected.owner_request);
    assert_eq!(rejected.role, Role::Tenant);
}

#[tokio::test]
async fn test_change_password_and_delete() {
    let store = Store::in_memory().await.unwrap();
    let person = persons::register(
        &store,
        &RegisterRequest {
            first_name: "Amine".to_string(),
            last_name: "Tazi".to_string(),
            email: "amine@example.com".to_string(),
            phone: Some("0611223344".to_string()),
            password: "first-pass".to_string(),
            role: None,
        },
    )
    .await
    .unwrap();

    let wrong = ChangePasswordRequest { old_password: "nope-nope".to_string(), new_password: "second-pass".to_string() };
    let err = persons::change_password(&store, person.id, &wrong).await.unwrap_err();
    assert_eq!(violation(err), RuleViolation::WrongPassword);

    let ok = ChangePasswordRequest { old_password: "first-pass".to_string(), new_password: "second-pass".to_string() };
    persons::change_password(&store, person.id, &ok).await.unwrap();
    assert!(persons::authenticate(&store, "amine@example.com", "second-pass").await.unwrap().is_some());

    assert!(store.get_person_by_phone("0611223344").await.unwrap().is_some());
    persons::delete(&store, person.id).await.unwrap();
    assert!(store.get_person(person.id).await.unwrap().is_none());
}

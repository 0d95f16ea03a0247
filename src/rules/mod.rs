//! Lifecycle rules for listings, rental requests, leases and payments.
//!
//! Everything here is pure: callers load the rows, ask these functions
//! whether a transition is allowed, then persist. A refused transition is a
//! `RuleViolation`, which the HTTP layer turns into a 400.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};

use crate::models::{
    LeaseStatus, Listing, ModerationStatus, OccupancyStatus, PaymentStatus, Person,
    RequestStatus, Role,
};

/// Business-rule violation raised by a lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    #[error("{message}")]
    ReasonRequired { field: &'static str, message: &'static str },
    #[error("a listing can only be rented once it has been validated")]
    RentedRequiresValidated,
    #[error("a rented listing must stay validated")]
    ListingRented,
    #[error("listing is not available for rent")]
    ListingNotAvailable,
    #[error("listing has not been validated yet")]
    ListingNotValidated,
    #[error("an active lease already exists for this listing")]
    ActiveLeaseExists,
    #[error("listing has leases and cannot be deleted")]
    ListingHasLeases,
    #[error("this person is not a landlord")]
    NotALandlord,
    #[error("landlord must be verified by an admin")]
    LandlordNotVerified,
    #[error("this person is not a tenant")]
    NotATenant,
    #[error("a pending request already exists for this listing")]
    DuplicatePendingRequest,
    #[error("this request has already been processed")]
    RequestAlreadyProcessed,
    #[error("rental request must be accepted before a lease is created")]
    RequestNotAccepted,
    #[error("rental request does not match the lease parties")]
    RequestMismatch,
    #[error("a lease already exists for this rental request")]
    RequestAlreadyLeased,
    #[error("either rental_request_id or listing_id and tenant_id are required")]
    MissingParties,
    #[error("end date must be after start date")]
    InvalidLeaseDates,
    #[error("lease is not active")]
    LeaseNotActive,
    #[error("month {0} is outside the lease period")]
    MonthOutsideLease(String),
    #[error("invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),
    #[error("this month is already paid")]
    AlreadyPaid,
    #[error("payment is not pending")]
    PaymentNotPending,
    #[error("payment has not been captured")]
    PaymentNotCaptured,
    #[error("captured payments can only be cancelled within {0} hours of capture")]
    CancelWindowElapsed(i64),
    #[error("ADMIN accounts cannot be self-registered")]
    AdminRegistrationRefused,
    #[error("email is already in use")]
    EmailTaken,
    #[error("phone number is already in use")]
    PhoneTaken,
    #[error("reference is already in use")]
    ReferenceTaken,
    #[error("no pending owner request for this person")]
    NoOwnerRequest,
    #[error("current password is incorrect")]
    WrongPassword,
    #[error("person still owns listings or holds leases")]
    PersonInUse,
    #[error("document must be a PDF")]
    NotPdf,
    #[error("document is required")]
    MissingDocument,
}

pub type RuleResult<T> = Result<T, RuleViolation>;

fn non_blank(reason: Option<&str>) -> Option<String> {
    reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string)
}

// ========== Persons ==========

pub fn ensure_verified_landlord(person: &Person) -> RuleResult<()> {
    if person.role != Role::Landlord {
        return Err(RuleViolation::NotALandlord);
    }
    if !person.verified {
        return Err(RuleViolation::LandlordNotVerified);
    }
    Ok(())
}

pub fn ensure_tenant(person: &Person) -> RuleResult<()> {
    if person.role != Role::Tenant {
        return Err(RuleViolation::NotATenant);
    }
    Ok(())
}

/// Role and verification state for a self-registration
pub fn registration_role(requested: Option<Role>) -> RuleResult<(Role, bool)> {
    match requested {
        Some(Role::Admin) => Err(RuleViolation::AdminRegistrationRefused),
        // landlords wait for admin approval
        Some(Role::Landlord) => Ok((Role::Landlord, true)),
        Some(Role::Tenant) | None => Ok((Role::Tenant, false)),
    }
}

// ========== Listings ==========

/// Decide a moderation change. Returns the rejection reason to store.
pub fn moderate(
    occupancy: OccupancyStatus,
    target: ModerationStatus,
    reason: Option<&str>,
) -> RuleResult<Option<String>> {
    if occupancy == OccupancyStatus::Rented && target != ModerationStatus::Validated {
        return Err(RuleViolation::ListingRented);
    }
    match target {
        ModerationStatus::Rejected => match non_blank(reason) {
            Some(reason) => Ok(Some(reason)),
            None => Err(RuleViolation::ReasonRequired {
                field: "reason",
                message: "rejection reason is required",
            }),
        },
        _ => Ok(None),
    }
}

pub fn change_occupancy(
    moderation: ModerationStatus,
    current: OccupancyStatus,
    target: OccupancyStatus,
    has_active_lease: bool,
) -> RuleResult<()> {
    if target == OccupancyStatus::Rented && moderation != ModerationStatus::Validated {
        return Err(RuleViolation::RentedRequiresValidated);
    }
    if current == OccupancyStatus::Rented && target != OccupancyStatus::Rented && has_active_lease {
        return Err(RuleViolation::ActiveLeaseExists);
    }
    Ok(())
}

/// A listing that can take new rental requests or a new lease
pub fn ensure_rentable(listing: &Listing) -> RuleResult<()> {
    if listing.occupancy_status != OccupancyStatus::Available {
        return Err(RuleViolation::ListingNotAvailable);
    }
    if listing.moderation_status != ModerationStatus::Validated {
        return Err(RuleViolation::ListingNotValidated);
    }
    Ok(())
}

// ========== Rental requests ==========

pub fn ensure_request_pending(status: RequestStatus) -> RuleResult<()> {
    if status != RequestStatus::Pending {
        return Err(RuleViolation::RequestAlreadyProcessed);
    }
    Ok(())
}

pub fn accept_request(status: RequestStatus, occupancy: OccupancyStatus) -> RuleResult<()> {
    ensure_request_pending(status)?;
    if occupancy != OccupancyStatus::Available {
        return Err(RuleViolation::ListingNotAvailable);
    }
    Ok(())
}

/// Validate a refusal and return the reason to store
pub fn refuse_request(status: RequestStatus, reason: Option<&str>) -> RuleResult<String> {
    ensure_request_pending(status)?;
    non_blank(reason).ok_or(RuleViolation::ReasonRequired {
        field: "reason",
        message: "refusal reason is required",
    })
}

// ========== Leases ==========

pub fn check_lease_dates(start: NaiveDate, end: NaiveDate) -> RuleResult<()> {
    if end <= start {
        return Err(RuleViolation::InvalidLeaseDates);
    }
    Ok(())
}

pub fn ensure_lease_active(status: LeaseStatus) -> RuleResult<()> {
    if status != LeaseStatus::Active {
        return Err(RuleViolation::LeaseNotActive);
    }
    Ok(())
}

/// Whole months covered by a lease, rounded up, at least one
pub fn lease_months(start: NaiveDate, end: NaiveDate) -> i32 {
    let mut months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    if end.day() > start.day() {
        months += 1;
    }
    months.max(1)
}

/// An ACTIVE lease whose end date is before `today` is due for expiry
pub fn is_expired(status: LeaseStatus, end_date: NaiveDate, today: NaiveDate) -> bool {
    status == LeaseStatus::Active && end_date < today
}

// ========== Payments ==========

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    let start = month_start(date);
    start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(start)
}

/// Parse `YYYY-MM` into the first day of that month
pub fn parse_month(month: &str) -> RuleResult<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map_err(|_| RuleViolation::InvalidMonth(month.to_string()))
}

/// The month must overlap the lease period
pub fn ensure_month_within_lease(month: NaiveDate, start: NaiveDate, end: NaiveDate) -> RuleResult<()> {
    if month_end(month) < start || month_start(month) > end {
        return Err(RuleViolation::MonthOutsideLease(month.format("%Y-%m").to_string()));
    }
    Ok(())
}

/// Due date for a month given the lease's payment day (1..=28)
pub fn due_date(month: NaiveDate, payment_day: Option<i32>) -> Option<NaiveDate> {
    let day = payment_day?;
    month_start(month).with_day(day.clamp(1, 28) as u32)
}

/// What initiation does with an existing row for the same (lease, month)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiation {
    Reuse,
    Reopen,
}

pub fn initiate_over(existing: PaymentStatus) -> RuleResult<Initiation> {
    match existing {
        PaymentStatus::Pending => Ok(Initiation::Reuse),
        PaymentStatus::Captured => Err(RuleViolation::AlreadyPaid),
        PaymentStatus::Failed | PaymentStatus::Cancelled => Ok(Initiation::Reopen),
    }
}

pub fn ensure_capturable(payment: PaymentStatus, lease: LeaseStatus) -> RuleResult<()> {
    match payment {
        PaymentStatus::Captured => return Err(RuleViolation::AlreadyPaid),
        PaymentStatus::Pending => {}
        _ => return Err(RuleViolation::PaymentNotPending),
    }
    ensure_lease_active(lease)
}

pub fn ensure_failable(payment: PaymentStatus) -> RuleResult<()> {
    if payment != PaymentStatus::Pending {
        return Err(RuleViolation::PaymentNotPending);
    }
    Ok(())
}

/// Pending payments cancel freely; captured ones only inside the grace window
pub fn ensure_cancellable(
    payment: PaymentStatus,
    captured_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace_hours: i64,
) -> RuleResult<()> {
    match payment {
        PaymentStatus::Pending => Ok(()),
        PaymentStatus::Captured => {
            let captured_at = captured_at.unwrap_or(now);
            if now - captured_at <= Duration::hours(grace_hours) {
                Ok(())
            } else {
                Err(RuleViolation::CancelWindowElapsed(grace_hours))
            }
        }
        _ => Err(RuleViolation::PaymentNotPending),
    }
}

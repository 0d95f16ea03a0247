mod leases;
mod listings;
mod payments;
mod persons;
mod receipts;
mod rental_requests;
pub(crate) mod row_helpers;

pub use leases::{LeaseRepo, NewLease};
pub use listings::ListingRepo;
pub use payments::{NewPayment, PaymentRepo};
pub use persons::{NewPerson, PersonRepo};
pub use receipts::ReceiptRepo;
pub use rental_requests::RentalRequestRepo;

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Connection, Pool, Sqlite, SqliteConnection,
};

use crate::models::*;

/// Typed error for "resource not found", downcast by the API error handler
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Shorthand for turning a missing row into a `NotFoundError`
pub fn found<T>(row: Option<T>, resource: &str, id: impl std::fmt::Display) -> Result<T> {
    row.ok_or_else(|| NotFoundError::new(resource, &id.to_string()).into())
}

/// How long a writer waits for the database lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Transaction opened with `BEGIN IMMEDIATE`. Workflows read before they
/// write; taking the write lock up front makes a concurrent writer wait on
/// the busy timeout instead of failing its lock upgrade with SQLITE_BUSY.
///
/// Dropping it without `commit()` rolls back on a background task before the
/// connection goes back to the pool.
pub struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    async fn begin(mut conn: PoolConnection<Sqlite>) -> Result<Self> {
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .context("Failed to begin transaction")?;
        Ok(Self { conn: Some(conn) })
    }

    pub async fn commit(mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            rollback(conn).await;
            return Err(anyhow::Error::from(e).context("Failed to commit transaction"));
        }
        Ok(())
    }
}

/// Roll back; a connection that cannot roll back is closed, never pooled
async fn rollback(mut conn: PoolConnection<Sqlite>) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        tracing::warn!("Rollback failed, closing connection: {}", e);
        if let Err(e) = conn.detach().close().await {
            tracing::debug!("Closing connection failed: {}", e);
        }
    }
}

impl Deref for WriteTx {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self.conn.as_ref() {
            Some(conn) => &**conn,
            None => unreachable!("transaction used after commit"),
        }
    }
}

impl DerefMut for WriteTx {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self.conn.as_mut() {
            Some(conn) => &mut **conn,
            None => unreachable!("transaction used after commit"),
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(rollback(conn));
            }
            // no runtime left to roll back on: drop the connection for good
            Err(_) => drop(conn.detach()),
        }
    }
}

/// Store owns the connection pool. Reads go through the facade methods below;
/// workflows that change several rows open a transaction with `begin()` and
/// call the repos directly.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection that never recycles,
    /// otherwise the schema would vanish with it.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Create the bootstrap admin if no admin account exists yet
    pub async fn seed_admin(&self, email: &str, password_hash: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        if PersonRepo::count_by_role(&mut tx, Role::Admin).await? > 0 {
            return Ok(());
        }
        PersonRepo::create(
            &mut tx,
            &NewPerson {
                first_name: "Admin".to_string(),
                last_name: "RentalHub".to_string(),
                email: email.to_lowercase(),
                phone: None,
                address: None,
                role: Role::Admin,
                verified: true,
                owner_request: false,
                password_hash: password_hash.to_string(),
            },
        )
        .await?;
        tx.commit().await?;
        tracing::info!("Created default admin account ({})", email);
        Ok(())
    }

    /// Open a write transaction for a multi-row workflow
    pub async fn begin(&self) -> Result<WriteTx> {
        WriteTx::begin(self.conn().await?).await
    }

    async fn conn(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await.context("Failed to acquire connection")
    }

    // ========== Persons ==========

    pub async fn list_persons(&self) -> Result<Vec<Person>> {
        PersonRepo::list(&mut *self.conn().await?).await
    }

    pub async fn list_persons_by_role(&self, role: Role) -> Result<Vec<Person>> {
        PersonRepo::list_by_role(&mut *self.conn().await?, role).await
    }

    pub async fn list_owner_requests(&self) -> Result<Vec<Person>> {
        PersonRepo::list_owner_requests(&mut *self.conn().await?).await
    }

    pub async fn get_person(&self, id: i64) -> Result<Option<Person>> {
        PersonRepo::get(&mut *self.conn().await?, id).await
    }

    pub async fn get_person_by_email(&self, email: &str) -> Result<Option<Person>> {
        PersonRepo::get_by_email(&mut *self.conn().await?, email).await
    }

    pub async fn get_person_by_phone(&self, phone: &str) -> Result<Option<Person>> {
        PersonRepo::get_by_phone(&mut *self.conn().await?, phone).await
    }

    // ========== Listings ==========

    pub async fn list_listings(&self) -> Result<Vec<Listing>> {
        ListingRepo::list(&mut *self.conn().await?).await
    }

    pub async fn list_listings_by_owner(&self, owner_id: i64) -> Result<Vec<Listing>> {
        ListingRepo::list_by_owner(&mut *self.conn().await?, owner_id).await
    }

    pub async fn list_listings_by_moderation(&self, status: ModerationStatus) -> Result<Vec<Listing>> {
        ListingRepo::list_by_moderation(&mut *self.conn().await?, status).await
    }

    pub async fn count_listings_by_moderation(&self, status: ModerationStatus) -> Result<i64> {
        ListingRepo::count_by_moderation(&mut *self.conn().await?, status).await
    }

    pub async fn list_available_listings(&self) -> Result<Vec<Listing>> {
        ListingRepo::list_available(&mut *self.conn().await?).await
    }

    pub async fn search_listings(&self, city: Option<&str>, property_type: Option<PropertyType>) -> Result<Vec<Listing>> {
        ListingRepo::search(&mut *self.conn().await?, city, property_type).await
    }

    pub async fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
        ListingRepo::get(&mut *self.conn().await?, id).await
    }

    pub async fn get_listing_by_reference(&self, reference: &str) -> Result<Option<Listing>> {
        ListingRepo::get_by_reference(&mut *self.conn().await?, reference).await
    }

    // ========== Rental requests ==========

    pub async fn list_rental_requests(&self) -> Result<Vec<RentalRequest>> {
        RentalRequestRepo::list(&mut *self.conn().await?).await
    }

    pub async fn list_rental_requests_by_tenant(&self, tenant_id: i64) -> Result<Vec<RentalRequest>> {
        RentalRequestRepo::list_by_tenant(&mut *self.conn().await?, tenant_id).await
    }

    pub async fn list_rental_requests_by_status(&self, status: RequestStatus) -> Result<Vec<RentalRequest>> {
        RentalRequestRepo::list_by_status(&mut *self.conn().await?, status).await
    }

    pub async fn count_rental_requests_by_status(&self, status: RequestStatus) -> Result<i64> {
        RentalRequestRepo::count_by_status(&mut *self.conn().await?, status).await
    }

    pub async fn get_rental_request(&self, id: i64) -> Result<Option<RentalRequest>> {
        RentalRequestRepo::get(&mut *self.conn().await?, id).await
    }

    // ========== Leases ==========

    pub async fn list_leases(&self) -> Result<Vec<Lease>> {
        LeaseRepo::list(&mut *self.conn().await?).await
    }

    pub async fn list_leases_by_tenant(&self, tenant_id: i64) -> Result<Vec<Lease>> {
        LeaseRepo::list_by_tenant(&mut *self.conn().await?, tenant_id).await
    }

    pub async fn list_leases_by_listing(&self, listing_id: i64) -> Result<Vec<Lease>> {
        LeaseRepo::list_by_listing(&mut *self.conn().await?, listing_id).await
    }

    pub async fn list_leases_by_owner(&self, owner_id: i64) -> Result<Vec<Lease>> {
        LeaseRepo::list_by_owner(&mut *self.conn().await?, owner_id).await
    }

    pub async fn list_leases_by_status(&self, status: LeaseStatus) -> Result<Vec<Lease>> {
        LeaseRepo::list_by_status(&mut *self.conn().await?, status).await
    }

    pub async fn get_lease(&self, id: i64) -> Result<Option<Lease>> {
        LeaseRepo::get(&mut *self.conn().await?, id).await
    }

    pub async fn get_lease_by_reference(&self, reference: &str) -> Result<Option<Lease>> {
        LeaseRepo::get_by_reference(&mut *self.conn().await?, reference).await
    }

    // ========== Payments ==========

    pub async fn list_payments(&self) -> Result<Vec<Payment>> {
        PaymentRepo::list(&mut *self.conn().await?).await
    }

    pub async fn list_payments_by_lease(&self, lease_id: i64) -> Result<Vec<Payment>> {
        PaymentRepo::list_by_lease(&mut *self.conn().await?, lease_id).await
    }

    pub async fn list_payments_by_tenant(&self, tenant_id: i64) -> Result<Vec<Payment>> {
        PaymentRepo::list_by_tenant(&mut *self.conn().await?, tenant_id).await
    }

    pub async fn get_payment(&self, id: i64) -> Result<Option<Payment>> {
        PaymentRepo::get(&mut *self.conn().await?, id).await
    }

    pub async fn get_receipt(&self, payment_id: i64) -> Result<Option<Receipt>> {
        ReceiptRepo::get_by_payment(&mut *self.conn().await?, payment_id).await
    }
}

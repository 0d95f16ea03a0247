mod auth;
mod config;
mod db;
mod handlers;
mod models;
mod receipts;
mod router;
mod rules;
mod services;
mod storage;
mod sweeper;

use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use db::Store;
use services::payments::PaymentPolicy;
use storage::DocumentStore;
use sweeper::LeaseSweeper;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub documents: DocumentStore,
    pub receipts: DocumentStore,
}

impl AppState {
    pub fn payment_policy(&self) -> PaymentPolicy {
        PaymentPolicy {
            currency: self.config.currency.clone(),
            cancel_grace_hours: self.config.payment_cancel_grace_hours,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rental_hub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut cfg = Config::load();
    if cfg.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET not set - generating random secret (tokens will be invalidated on restart)");
        cfg.jwt_secret = uuid::Uuid::new_v4().to_string();
    }
    tracing::info!("Starting RentalHub Server");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("Documents: {}", cfg.documents_dir);
    tracing::info!("Receipts: {}", cfg.receipts_dir);
    tracing::info!("Listen: {}", cfg.listen_addr);

    // Initialize database
    let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
    tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

    let admin_hash = services::persons::hash_password(&cfg.admin_password)?;
    store.seed_admin(&cfg.admin_email, &admin_hash).await?;

    // Start lease expiry sweeper
    let mut lease_sweeper = LeaseSweeper::new(store.clone(), &cfg.lease_sweep_schedule);
    lease_sweeper.start();

    // Create app state
    let state = Arc::new(AppState {
        store,
        config: cfg.clone(),
        documents: DocumentStore::new(&cfg.documents_dir),
        receipts: DocumentStore::new(&cfg.receipts_dir),
    });

    // Build router
    let app = router::build(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("RentalHub listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lease_sweeper.stop();
    tracing::info!("RentalHub shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

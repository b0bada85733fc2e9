//! PrimeBot Server
//!
//! Restores membership state from the backup when the store is empty, runs
//! the daily sweep on a schedule and serves the keep-alive and admin
//! endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use primebot::{
    routes::create_router,
    scheduler::start_sweep_scheduler,
    state::{build_context, open_store},
    AppState, Config,
};
use primebot_membership::{reconcile_on_startup, RestoreReport, SystemClock};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,primebot=debug,primebot_membership=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PrimeBot v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config).await?;
    let ctx = build_context(&config, store, reqwest::Client::new());

    // Restore from the backup before anything can write to the store
    match reconcile_on_startup(
        ctx.store.as_ref(),
        ctx.backup.as_ref(),
        Some(ctx.roles.as_ref()),
    )
    .await?
    {
        RestoreReport::StoreNotEmpty { members } => {
            tracing::info!(members, "Store already populated, backup not consulted")
        }
        RestoreReport::BackupUnavailable { error } => {
            tracing::warn!(error = %error, "Backup unavailable, starting with an empty store")
        }
        RestoreReport::Restored {
            restored,
            store_failures,
            role_failures,
        } => tracing::info!(
            restored,
            store_failures,
            role_failures,
            "Membership restored from backup"
        ),
    }

    let clock = Arc::new(SystemClock);
    let _scheduler = start_sweep_scheduler(ctx.clone(), clock.clone(), &config.sweep_cron).await?;

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse()?;
    let state = AppState::with_clock(ctx, config, clock);

    let app = create_router(state).layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

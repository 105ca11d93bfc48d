//! Ringbid maintenance runner
//!
//! Wires configuration, the database pool, and the periodic expiration
//! sweeper. Request-facing surfaces (bid placement, settlement) are
//! embedded by API processes out of scope here; this binary keeps the
//! bid pool clean on a schedule.

use anyhow::Context;
use ringbid_core::AppConfig;
use ringbid_db::{create_pool, run_migrations, PgBidRepository};
use ringbid_engine::ExpirationSweeper;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = AppConfig::load().context("loading configuration")?;

    let pool = create_pool(
        &config.database.url,
        Some(config.database.max_connections),
    )
    .await
    .context("connecting to database")?;

    run_migrations(&pool).await.context("running migrations")?;

    let bids = Arc::new(PgBidRepository::new(pool.clone()));
    let sweeper = ExpirationSweeper::new(bids, &config.sweeper);

    info!(
        interval_secs = config.sweeper.interval_secs,
        "starting expiration sweeper"
    );
    let sweep_task = tokio::spawn(sweeper.run());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    sweep_task.abort();

    Ok(())
}

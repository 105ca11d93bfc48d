//! Expiration sweeper
//!
//! Periodic maintenance task transitioning stale bids to `expired`.
//! Externally scheduled deployments can call [`ExpirationSweeper::run_once`]
//! from their own trigger instead of the built-in interval loop.

use chrono::Utc;
use ringbid_core::{config::SweeperConfig, traits::BidRepository, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Periodic bid expiration task
pub struct ExpirationSweeper {
    bids: Arc<dyn BidRepository>,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(bids: Arc<dyn BidRepository>, config: &SweeperConfig) -> Self {
        Self {
            bids,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    /// One sweep over bids whose window has passed
    pub async fn run_once(&self) -> AppResult<u64> {
        let count = self.bids.sweep_expired(Utc::now()).await?;
        if count > 0 {
            info!(count, "expiration sweep transitioned bids");
        }
        Ok(count)
    }

    /// Sweep on the configured interval until the task is aborted
    ///
    /// A failed sweep is logged and retried at the next tick; bids only
    /// stay eligible a little longer, they never expire twice.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "expiration sweep failed");
            }
        }
    }
}

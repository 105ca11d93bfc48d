//! Ledger service
//!
//! Thin orchestration over a [`LedgerStore`]: bounded retry on
//! serialization conflicts, and forwarding of reconciliation flags when
//! the store reports a committed balance mutation whose audit write
//! failed. The store itself owns atomicity and the credit-limit
//! invariant; this layer never re-checks balances.

use crate::retry::RetryPolicy;
use ringbid_core::{
    config::AuctionConfig,
    models::{LedgerEntry, Money, ReconciliationFlag},
    traits::LedgerStore,
    AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Ledger service
///
/// Cheap to clone via `Arc`; safe to share across tasks.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
    reconciliation_tx: Option<mpsc::UnboundedSender<ReconciliationFlag>>,
}

impl Ledger {
    /// Create a ledger service with the default retry policy
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            reconciliation_tx: None,
        }
    }

    /// Create a ledger service with retry knobs from configuration
    pub fn from_config(store: Arc<dyn LedgerStore>, config: &AuctionConfig) -> Self {
        Self {
            store,
            retry: RetryPolicy::new(
                config.max_ledger_retries,
                Duration::from_millis(config.retry_initial_delay_ms),
                Duration::from_millis(config.retry_max_delay_ms),
            ),
            reconciliation_tx: None,
        }
    }

    /// Attach a channel receiving reconciliation flags
    pub fn with_reconciliation(mut self, tx: mpsc::UnboundedSender<ReconciliationFlag>) -> Self {
        self.reconciliation_tx = Some(tx);
        self
    }

    /// Atomically apply a signed delta to an account balance
    ///
    /// Retries the original delta on transient conflicts up to the
    /// configured bound, then surfaces `Conflict`. Invariant violations
    /// (`InsufficientBalance`, `CurrencyMismatch`) are definitive and
    /// returned immediately.
    #[instrument(skip(self))]
    pub async fn apply_delta(
        &self,
        account_id: i64,
        delta: Money,
        reason: &str,
    ) -> AppResult<Money> {
        let mut attempt = 0;
        loop {
            match self.store.apply_delta(account_id, delta, reason).await {
                Ok(applied) => {
                    if let Some(flag) = applied.reconciliation {
                        self.emit_reconciliation(flag);
                    }
                    info!(
                        account_id,
                        delta = %delta,
                        new_balance = %applied.new_balance,
                        "ledger delta applied"
                    );
                    return Ok(applied.new_balance);
                }
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!(
                        account_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "ledger conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Lock-free point-in-time balance read (display only)
    pub async fn get_balance(&self, account_id: i64) -> AppResult<Money> {
        self.store.get_balance(account_id).await
    }

    /// Audit trail for an account, newest first
    pub async fn entries(&self, account_id: i64, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        self.store.entries(account_id, limit).await
    }

    fn emit_reconciliation(&self, flag: ReconciliationFlag) {
        warn!(
            account_id = flag.account_id,
            delta = %flag.delta,
            error = %flag.error,
            "balance committed without audit entry; reconciliation required"
        );
        if let Some(tx) = &self.reconciliation_tx {
            // receiver gone means nobody is reconciling; the warn above
            // is the remaining signal
            let _ = tx.send(flag);
        }
    }
}

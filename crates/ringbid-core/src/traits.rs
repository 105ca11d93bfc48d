//! Common traits for stores, gates, and matching policies
//!
//! The exchange core consumes storage through these narrow interfaces.
//! Implementations live in `ringbid-db` (PostgreSQL, in-memory); the
//! engine never issues SQL itself.

use crate::error::AppError;
use crate::models::{
    Account, Bid, BidStatus, Call, CallStatus, LedgerEntry, Money, ReconciliationFlag,
    TerminationCause,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of one committed balance mutation
///
/// `entry` is present when the audit row was written in the same atomic
/// unit; `reconciliation` is present instead when the audit write failed
/// but the balance mutation still committed.
#[derive(Debug, Clone)]
pub struct LedgerApplied {
    pub new_balance: Money,
    pub entry: Option<LedgerEntry>,
    pub reconciliation: Option<ReconciliationFlag>,
}

/// Authoritative balance store
///
/// Implementations must run `apply_delta` as one all-or-nothing unit
/// under an exclusive per-account lock: read balance, check the
/// `balance >= -credit_limit` invariant via [`Account::check_delta`],
/// write the new balance, append the audit entry. Serialization
/// conflicts and lock timeouts surface as retryable
/// [`AppError::Conflict`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically apply a signed delta to one account's balance
    async fn apply_delta(
        &self,
        account_id: i64,
        delta: Money,
        reason: &str,
    ) -> Result<LedgerApplied, AppError>;

    /// Lock-free point-in-time balance read (display only)
    async fn get_balance(&self, account_id: i64) -> Result<Money, AppError>;

    /// Audit trail for an account, newest first
    async fn entries(&self, account_id: i64, limit: i64) -> Result<Vec<LedgerEntry>, AppError>;
}

/// Read-only account lookups
///
/// Account provisioning lives outside the core; the engine only needs
/// current attributes for eligibility checks.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn get_account(&self, id: i64) -> Result<Option<Account>, AppError>;
}

/// Bid storage with auction-relevant operations
#[async_trait]
pub trait BidRepository: Send + Sync {
    /// Insert a new bid
    async fn create(&self, bid: &Bid) -> Result<Bid, AppError>;

    /// Find bid by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Bid>, AppError>;

    /// All bids on a call, regardless of status
    async fn find_for_call(&self, call_id: Uuid) -> Result<Vec<Bid>, AppError>;

    /// Settle-eligible bids on a call: status in {active, winning} and
    /// not yet expired at `now`
    async fn find_open_for_call(
        &self,
        call_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bid>, AppError>;

    /// Typed compare-and-swap on bid status
    ///
    /// The update applies only while the bid's current status is one of
    /// `expected`; returns `false` (no rows changed) otherwise. First
    /// writer to match wins.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: &[BidStatus],
        next: BidStatus,
        accepted_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError>;

    /// Transition every non-terminal bid on the call except `winner` to
    /// `lost`; returns the number of bids transitioned
    async fn mark_losers(&self, call_id: Uuid, winner: Uuid) -> Result<u64, AppError>;

    /// Settlement compensation: return `lost` bids on the call (except
    /// `skip`) to `active` so the next attempt can re-rank them
    async fn restore_losers(&self, call_id: Uuid, skip: Uuid) -> Result<u64, AppError>;

    /// Persist display ranks computed by the auction engine
    async fn update_ranks(&self, ranks: &[(Uuid, i32)]) -> Result<(), AppError>;

    /// Expire every bid with `expires_at < before` whose status is still
    /// in the expirable set; returns the number expired
    async fn sweep_expired(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Field set written atomically with a call status transition
///
/// Every field is written as given: `None` clears the column. Callers
/// pass the complete intended post-transition state.
#[derive(Debug, Clone, Default)]
pub struct CallAssignment {
    pub buyer_id: Option<i64>,
    pub seller_id: Option<i64>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i32>,
    pub cost: Option<Money>,
    pub termination_cause: Option<TerminationCause>,
}

impl CallAssignment {
    /// Assignment for settlement: bind buyer and seller
    pub fn assign(buyer_id: i64, seller_id: Option<i64>) -> Self {
        Self {
            buyer_id: Some(buyer_id),
            seller_id,
            ..Self::default()
        }
    }
}

/// Call storage with the compare-and-swap transition path
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Insert a new call
    async fn create(&self, call: &Call) -> Result<Call, AppError>;

    /// Find call by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Call>, AppError>;

    /// Conditional status transition
    ///
    /// Applies only if the persisted status equals `expected`; the
    /// status, assignment, and terminal fields update in one write.
    /// Returns `false` when the precondition did not hold (no rows
    /// changed). This is the only path that may change call status
    /// during settlement.
    async fn transition_if_status(
        &self,
        id: Uuid,
        expected: CallStatus,
        next: CallStatus,
        fields: CallAssignment,
    ) -> Result<bool, AppError>;

    /// Unconditional update for non-status metadata; must never be used
    /// for settlement-driven status changes
    async fn update_metadata(
        &self,
        id: Uuid,
        geography: Option<&str>,
        call_type: Option<&str>,
        keywords: &[String],
    ) -> Result<(), AppError>;
}

/// Regulatory allow/deny check consumed before a bid/call pairing is
/// finalized
///
/// Backed externally by DNC-list and TCPA time-window sources. The core
/// treats `false` as unconditional ineligibility and an `Err` as
/// ineligibility as well (fail closed); it never interprets *why*.
#[async_trait]
pub trait ComplianceGate: Send + Sync {
    async fn is_allowed(&self, phone_number: &str, at: DateTime<Utc>) -> Result<bool, AppError>;
}

/// Pluggable capacity-aware matching policy
///
/// Whether a buyer can take one more call right now is a question the
/// exchange cannot answer from bid data alone; implementations plug in
/// here. The default admits everything.
#[async_trait]
pub trait CapacityPolicy: Send + Sync {
    async fn admits(&self, bid: &Bid, call: &Call) -> Result<bool, AppError>;
}

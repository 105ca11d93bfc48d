//! In-memory store implementation
//!
//! Implements every storage trait over locked maps with the same
//! semantics as the PostgreSQL repositories: `apply_delta` runs its
//! read-check-write-append sequence under one lock, and status writes
//! are compare-and-swap (first writer to match the expected prior state
//! wins). Non-persistent; used by engine tests and embeddable
//! deployments.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ringbid_core::{
    models::{
        Account, AccountStatus, Bid, BidStatus, Call, CallStatus, LedgerEntry, Money,
    },
    traits::{
        AccountDirectory, BidRepository, CallAssignment, CallRepository, LedgerApplied,
        LedgerStore,
    },
    AppError, AppResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    accounts: HashMap<i64, Account>,
    entries: Vec<LedgerEntry>,
    bids: HashMap<Uuid, Bid>,
    calls: HashMap<Uuid, Call>,
}

/// In-memory store for accounts, ledger entries, bids, and calls
///
/// A single lock over the data set makes every operation atomic, which
/// is exactly the isolation the PostgreSQL implementations provide per
/// row; contention is resolved by lock acquisition order.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account (provisioning is external to the core)
    pub fn insert_account(&self, account: Account) {
        self.inner.lock().accounts.insert(account.id, account);
    }

    /// Number of ledger entries recorded so far
    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn apply_delta(
        &self,
        account_id: i64,
        delta: Money,
        reason: &str,
    ) -> AppResult<LedgerApplied> {
        let mut inner = self.inner.lock();

        let account = inner
            .accounts
            .get(&account_id)
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        if account.status == AccountStatus::Closed {
            return Err(AppError::Validation(format!(
                "account {} is closed",
                account_id
            )));
        }

        let new_balance = Account::check_delta(&account.balance, &account.credit_limit, &delta)?;

        let entry = LedgerEntry::record(account_id, delta, new_balance, reason.to_string());

        if let Some(account) = inner.accounts.get_mut(&account_id) {
            account.balance = new_balance;
            account.updated_at = Utc::now();
        }
        inner.entries.push(entry.clone());

        debug!("Applied {} to account {}", delta, account_id);

        Ok(LedgerApplied {
            new_balance,
            entry: Some(entry),
            reconciliation: None,
        })
    }

    async fn get_balance(&self, account_id: i64) -> AppResult<Money> {
        let inner = self.inner.lock();
        inner
            .accounts
            .get(&account_id)
            .map(|a| a.balance)
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
    }

    async fn entries(&self, account_id: i64, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .iter()
            .rev()
            .filter(|e| e.account_id == account_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn get_account(&self, id: i64) -> AppResult<Option<Account>> {
        Ok(self.inner.lock().accounts.get(&id).cloned())
    }
}

#[async_trait]
impl BidRepository for MemoryStore {
    async fn create(&self, bid: &Bid) -> AppResult<Bid> {
        let mut inner = self.inner.lock();
        inner.bids.insert(bid.id, bid.clone());
        Ok(bid.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Bid>> {
        Ok(self.inner.lock().bids.get(&id).cloned())
    }

    async fn find_for_call(&self, call_id: Uuid) -> AppResult<Vec<Bid>> {
        let inner = self.inner.lock();
        let mut bids: Vec<Bid> = inner
            .bids
            .values()
            .filter(|b| b.call_id == call_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| b.placed_at);
        Ok(bids)
    }

    async fn find_open_for_call(&self, call_id: Uuid, now: DateTime<Utc>) -> AppResult<Vec<Bid>> {
        let inner = self.inner.lock();
        let mut bids: Vec<Bid> = inner
            .bids
            .values()
            .filter(|b| {
                b.call_id == call_id && b.status.is_settle_eligible() && b.expires_at > now
            })
            .cloned()
            .collect();
        bids.sort_by_key(|b| b.placed_at);
        Ok(bids)
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: &[BidStatus],
        next: BidStatus,
        accepted_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        match inner.bids.get_mut(&id) {
            Some(bid) if expected.contains(&bid.status) => {
                bid.status = next;
                if accepted_at.is_some() {
                    bid.accepted_at = accepted_at;
                }
                bid.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_losers(&self, call_id: Uuid, winner: Uuid) -> AppResult<u64> {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for bid in inner.bids.values_mut() {
            if bid.call_id == call_id && bid.id != winner && !bid.status.is_terminal() {
                bid.status = BidStatus::Lost;
                bid.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn restore_losers(&self, call_id: Uuid, skip: Uuid) -> AppResult<u64> {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for bid in inner.bids.values_mut() {
            if bid.call_id == call_id && bid.id != skip && bid.status == BidStatus::Lost {
                bid.status = BidStatus::Active;
                bid.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update_ranks(&self, ranks: &[(Uuid, i32)]) -> AppResult<()> {
        let mut inner = self.inner.lock();
        for (id, rank) in ranks {
            if let Some(bid) = inner.bids.get_mut(id) {
                bid.rank = Some(*rank);
            }
        }
        Ok(())
    }

    async fn sweep_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for bid in inner.bids.values_mut() {
            if bid.expires_at < before && bid.status.is_expirable() {
                bid.status = BidStatus::Expired;
                bid.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl CallRepository for MemoryStore {
    async fn create(&self, call: &Call) -> AppResult<Call> {
        call.validate()?;
        let mut inner = self.inner.lock();
        inner.calls.insert(call.id, call.clone());
        Ok(call.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Call>> {
        Ok(self.inner.lock().calls.get(&id).cloned())
    }

    async fn transition_if_status(
        &self,
        id: Uuid,
        expected: CallStatus,
        next: CallStatus,
        fields: CallAssignment,
    ) -> AppResult<bool> {
        if !expected.can_transition_to(next) {
            return Err(AppError::InvalidInput(format!(
                "illegal call transition {} -> {}",
                expected, next
            )));
        }

        let mut inner = self.inner.lock();
        match inner.calls.get_mut(&id) {
            Some(call) if call.status == expected => {
                call.status = next;
                call.buyer_id = fields.buyer_id;
                call.seller_id = fields.seller_id;
                call.end_time = fields.end_time;
                call.duration_secs = fields.duration_secs;
                call.cost = fields.cost;
                call.termination_cause = fields.termination_cause;
                call.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn update_metadata(
        &self,
        id: Uuid,
        geography: Option<&str>,
        call_type: Option<&str>,
        keywords: &[String],
    ) -> AppResult<()> {
        let mut inner = self.inner.lock();
        let call = inner
            .calls
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;
        call.geography = geography.map(str::to_string);
        call.call_type = call_type.map(str::to_string);
        call.keywords = keywords.to_vec();
        call.updated_at = Utc::now();
        Ok(())
    }
}

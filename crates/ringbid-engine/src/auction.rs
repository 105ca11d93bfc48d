//! Bid/Auction engine
//!
//! Orchestrates the bid store, call store, ledger, and compliance gate
//! to rank bids for a call, settle exactly one winner, and expire stale
//! bids. Settlement is compare-and-swap choreography: each write
//! applies only if the target is still in the expected prior state, and
//! a failed step runs documented compensating writes before retrying.

use crate::criteria::bid_matches_call;
use crate::ledger::Ledger;
use chrono::{DateTime, Utc};
use ringbid_core::{
    config::AuctionConfig,
    models::{Bid, BidStatus, Call, CallStatus, PlaceBid},
    traits::{
        AccountDirectory, BidRepository, CallAssignment, CallRepository, CapacityPolicy,
        ComplianceGate,
    },
    AppError, AppResult,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Admit-all capacity policy
///
/// Capacity-aware matching depends on buyer infrastructure the core
/// cannot see; deployments plug a real policy in through
/// [`CapacityPolicy`].
pub struct UnboundedCapacity;

#[async_trait]
impl CapacityPolicy for UnboundedCapacity {
    async fn admits(&self, _bid: &Bid, _call: &Call) -> AppResult<bool> {
        Ok(true)
    }
}

/// Outcome of a successful settlement
#[derive(Debug, Clone)]
pub struct Settlement {
    pub call: Call,
    pub winning_bid: Bid,
}

/// Auction engine
pub struct AuctionEngine {
    bids: Arc<dyn BidRepository>,
    calls: Arc<dyn CallRepository>,
    accounts: Arc<dyn AccountDirectory>,
    ledger: Arc<Ledger>,
    gate: Arc<dyn ComplianceGate>,
    capacity: Arc<dyn CapacityPolicy>,
    config: AuctionConfig,
}

impl AuctionEngine {
    pub fn new(
        bids: Arc<dyn BidRepository>,
        calls: Arc<dyn CallRepository>,
        accounts: Arc<dyn AccountDirectory>,
        ledger: Arc<Ledger>,
        gate: Arc<dyn ComplianceGate>,
        config: AuctionConfig,
    ) -> Self {
        Self {
            bids,
            calls,
            accounts,
            ledger,
            gate,
            capacity: Arc::new(UnboundedCapacity),
            config,
        }
    }

    /// Replace the default admit-all capacity policy
    pub fn with_capacity_policy(mut self, capacity: Arc<dyn CapacityPolicy>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Validate and insert a new bid
    #[instrument(skip(self, cmd))]
    pub async fn place_bid(&self, cmd: PlaceBid) -> AppResult<Bid> {
        cmd.validate()?;

        self.calls
            .find_by_id(cmd.call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(cmd.call_id.to_string()))?;

        let account = self
            .accounts
            .get_account(cmd.buyer_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(cmd.buyer_id.to_string()))?;
        if !account.is_active() {
            return Err(AppError::Validation(format!(
                "account {} cannot place bids (status {})",
                account.id, account.status
            )));
        }

        let bid = cmd.into_bid(Utc::now());
        let created = self.bids.create(&bid).await?;
        info!(
            bid_id = %created.id,
            call_id = %created.call_id,
            amount = %created.amount,
            "bid placed"
        );
        Ok(created)
    }

    /// Buyer-initiated withdrawal of a non-terminal bid
    #[instrument(skip(self))]
    pub async fn cancel_bid(&self, bid_id: Uuid) -> AppResult<Bid> {
        let bid = self
            .bids
            .find_by_id(bid_id)
            .await?
            .ok_or_else(|| AppError::BidNotFound(bid_id.to_string()))?;

        let swapped = self
            .bids
            .compare_and_swap(
                bid_id,
                &[BidStatus::Pending, BidStatus::Active, BidStatus::Winning],
                BidStatus::Canceled,
                None,
            )
            .await?;

        if !swapped {
            return Err(AppError::StatusConflict {
                entity: "bid",
                id: bid_id.to_string(),
            });
        }

        info!(bid_id = %bid_id, call_id = %bid.call_id, "bid canceled");
        self.bids
            .find_by_id(bid_id)
            .await?
            .ok_or_else(|| AppError::BidNotFound(bid_id.to_string()))
    }

    /// Find a bid
    pub async fn get_bid(&self, bid_id: Uuid) -> AppResult<Bid> {
        self.bids
            .find_by_id(bid_id)
            .await?
            .ok_or_else(|| AppError::BidNotFound(bid_id.to_string()))
    }

    /// Rank the eligible bids for a call
    ///
    /// Eligibility: settle-eligible status, unexpired, compliance gate
    /// allows the call, criteria match, capacity policy admits, and the
    /// buyer can afford the amount. Order: amount descending, placement
    /// time ascending, bid id as the final deterministic tiebreaker.
    /// The returned `rank` fields are 0-based; rank 0 is the winner
    /// candidate.
    #[instrument(skip(self))]
    pub async fn rank_active_bids(&self, call_id: Uuid) -> AppResult<Vec<Bid>> {
        let call = self
            .calls
            .find_by_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?;

        let now = Utc::now();

        // One compliance decision covers every bid on the call. Errors
        // fail closed: an unavailable check suppresses the auction.
        match self.gate.is_allowed(&call.to_number, now).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(call_id = %call_id, "call suppressed by compliance gate");
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "compliance check unavailable, failing closed");
                return Ok(Vec::new());
            }
        }

        let open = self.bids.find_open_for_call(call_id, now).await?;
        let mut eligible = Vec::with_capacity(open.len());
        for bid in open {
            if self.is_eligible(&bid, &call, now).await {
                eligible.push(bid);
            }
        }

        eligible.sort_by(ranking_order);
        for (i, bid) in eligible.iter_mut().enumerate() {
            bid.rank = Some(i as i32);
        }

        // Display state below is best-effort: a lost write here is
        // corrected by the next ranking pass.
        let ranks: Vec<(Uuid, i32)> = eligible
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id, i as i32))
            .collect();
        if let Err(e) = self.bids.update_ranks(&ranks).await {
            warn!(call_id = %call_id, error = %e, "failed to persist bid ranks");
        }
        self.refresh_leader_marker(&eligible).await;

        Ok(eligible)
    }

    /// Mark the rank-0 bid `winning` and demote stale leaders
    async fn refresh_leader_marker(&self, ranked: &[Bid]) {
        if let Some(leader) = ranked.first() {
            if leader.status == BidStatus::Active {
                if let Err(e) = self
                    .bids
                    .compare_and_swap(leader.id, &[BidStatus::Active], BidStatus::Winning, None)
                    .await
                {
                    warn!(bid_id = %leader.id, error = %e, "failed to mark leader");
                }
            }
        }
        for bid in ranked.iter().skip(1) {
            if bid.status == BidStatus::Winning {
                if let Err(e) = self
                    .bids
                    .compare_and_swap(bid.id, &[BidStatus::Winning], BidStatus::Active, None)
                    .await
                {
                    warn!(bid_id = %bid.id, error = %e, "failed to demote stale leader");
                }
            }
        }
    }

    async fn is_eligible(&self, bid: &Bid, call: &Call, now: DateTime<Utc>) -> bool {
        match bid_matches_call(bid, call, now) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(bid_id = %bid.id, error = %e, "criteria evaluation failed, bid ineligible");
                return false;
            }
        }

        match self.capacity.admits(bid, call).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(bid_id = %bid.id, error = %e, "capacity policy failed, bid ineligible");
                return false;
            }
        }

        // Affordability: a bid the buyer cannot cover is not eligible,
        // even if posted. The authoritative check still happens under
        // the ledger's row lock at settlement.
        let account = match self.accounts.get_account(bid.buyer_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(bid_id = %bid.id, buyer_id = bid.buyer_id, "bid references unknown buyer");
                return false;
            }
            Err(e) => {
                warn!(bid_id = %bid.id, error = %e, "buyer lookup failed, bid ineligible");
                return false;
            }
        };
        if !account.is_active() {
            return false;
        }
        let available = match account.available_balance() {
            Ok(available) => available,
            Err(e) => {
                warn!(buyer_id = bid.buyer_id, error = %e, "account balance inconsistent");
                return false;
            }
        };
        match available.try_ge(&bid.amount) {
            Ok(affordable) => affordable,
            Err(e) => {
                warn!(bid_id = %bid.id, error = %e, "bid currency differs from account");
                false
            }
        }
    }

    /// Settle the auction for a call
    ///
    /// At most one settlement succeeds per call; concurrent attempts
    /// lose the call CAS and receive `AlreadyAssigned`. A failure after
    /// partial steps compensates (winner back out, losers restored,
    /// call returned to the pool) and retries with the next candidate,
    /// bounded by `max_settle_attempts`.
    #[instrument(skip(self))]
    pub async fn settle(&self, call_id: Uuid) -> AppResult<Settlement> {
        for attempt in 0..self.config.max_settle_attempts {
            let call = self
                .calls
                .find_by_id(call_id)
                .await?
                .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?;
            if !call.is_open_for_auction() {
                return Err(AppError::AlreadyAssigned(call_id.to_string()));
            }

            let ranked = self.rank_active_bids(call_id).await?;
            let Some(candidate) = ranked.first().cloned() else {
                return Err(AppError::NoEligibleBids(call_id.to_string()));
            };

            debug!(
                call_id = %call_id,
                bid_id = %candidate.id,
                amount = %candidate.amount,
                attempt,
                "settlement candidate selected"
            );

            // Step 1: claim the call. Losing this CAS means another
            // settlement already assigned it; no side effects yet.
            let claimed = self
                .calls
                .transition_if_status(
                    call_id,
                    CallStatus::Pending,
                    CallStatus::Queued,
                    CallAssignment::assign(candidate.buyer_id, call.seller_id),
                )
                .await?;
            if !claimed {
                return Err(AppError::AlreadyAssigned(call_id.to_string()));
            }

            // Step 2: promote the candidate. If it expired or was
            // canceled underneath, release the call and re-rank.
            let won = self
                .bids
                .compare_and_swap(
                    candidate.id,
                    &[BidStatus::Active, BidStatus::Winning],
                    BidStatus::Won,
                    Some(Utc::now()),
                )
                .await?;
            if !won {
                warn!(
                    call_id = %call_id,
                    bid_id = %candidate.id,
                    "candidate changed during settlement, releasing call"
                );
                self.release_call(call_id).await;
                continue;
            }

            // Step 3: everyone else loses.
            self.bids.mark_losers(call_id, candidate.id).await?;

            // Step 4: move the money. The ledger re-checks the credit
            // limit under its own row lock; a definitive refusal here
            // compensates steps 1-3 and tries the next candidate.
            let reason = format!("auction settlement: call {}", call_id);
            match self
                .ledger
                .apply_delta(candidate.buyer_id, candidate.amount.negated(), &reason)
                .await
            {
                Ok(_) => {
                    let call = self
                        .calls
                        .find_by_id(call_id)
                        .await?
                        .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?;
                    let winning_bid = self
                        .bids
                        .find_by_id(candidate.id)
                        .await?
                        .ok_or_else(|| AppError::BidNotFound(candidate.id.to_string()))?;
                    info!(
                        call_id = %call_id,
                        bid_id = %winning_bid.id,
                        buyer_id = winning_bid.buyer_id,
                        amount = %winning_bid.amount,
                        "auction settled"
                    );
                    return Ok(Settlement { call, winning_bid });
                }
                Err(e) => {
                    warn!(
                        call_id = %call_id,
                        bid_id = %candidate.id,
                        error = %e,
                        "settlement debit failed, compensating"
                    );
                    self.compensate(call_id, candidate.id).await;
                    if matches!(e, AppError::InsufficientBalance { .. }) {
                        // next candidate gets its chance on the next pass
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(AppError::Conflict(format!(
            "settlement attempts exhausted for call {}",
            call_id
        )))
    }

    /// Expire stale bids
    ///
    /// Only bids still in the expirable set transition; a bid that
    /// settled mid-sweep is untouched. Safe to run concurrently with
    /// settlement.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let count = self.bids.sweep_expired(before).await?;
        if count > 0 {
            info!(count, "expired stale bids");
        }
        Ok(count)
    }

    /// Compensating writes for a settlement that failed after the call
    /// was claimed. The failed candidate is parked in `lost` (not
    /// restored), other losers return to `active` before the call
    /// reopens, so a concurrent settle never sees an assignable call
    /// whose bids are all terminal.
    async fn compensate(&self, call_id: Uuid, candidate_id: Uuid) {
        if let Err(e) = self
            .bids
            .compare_and_swap(candidate_id, &[BidStatus::Won], BidStatus::Lost, None)
            .await
        {
            warn!(bid_id = %candidate_id, error = %e, "failed to back out winner");
        }
        if let Err(e) = self.bids.restore_losers(call_id, candidate_id).await {
            warn!(call_id = %call_id, error = %e, "failed to restore losing bids");
        }
        self.release_call(call_id).await;
    }

    /// Return a claimed call to the auction pool
    async fn release_call(&self, call_id: Uuid) {
        match self
            .calls
            .transition_if_status(
                call_id,
                CallStatus::Queued,
                CallStatus::Pending,
                CallAssignment::default(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(call_id = %call_id, "call moved during compensation, leaving as-is");
            }
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "failed to release call");
            }
        }
    }
}

/// Total ranking order: amount descending, placement time ascending,
/// id ascending. Amounts compare numerically; eligibility filtering has
/// already pinned every candidate to the buyer's account currency.
pub(crate) fn ranking_order(a: &Bid, b: &Bid) -> Ordering {
    b.amount
        .amount
        .cmp(&a.amount.amount)
        .then_with(|| a.placed_at.cmp(&b.placed_at))
        .then_with(|| a.id.cmp(&b.id))
}

//! End-to-end engine tests over the in-memory store
//!
//! Exercises ranking, settlement, expiration, the ledger invariants,
//! and the concurrency properties: single winner per call, no lost
//! balance updates, compensation on a failed settlement debit.

use chrono::{Duration, Utc};
use futures::future::join_all;
use ringbid_core::{
    config::AuctionConfig,
    models::{
        Account, AccountStatus, Bid, BidCriteria, BidStatus, Call, CallDirection, CallStatus,
        Currency, Money, PlaceBid,
    },
    traits::{BidRepository, CallRepository, ComplianceGate, LedgerApplied, LedgerStore},
    AppError,
};
use ringbid_db::MemoryStore;
use ringbid_engine::{AuctionEngine, CompositeGate, DncListGate, Ledger};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

fn account(id: i64, balance: Money, credit_limit: Money) -> Account {
    let now = Utc::now();
    Account {
        id,
        balance,
        credit_limit,
        quality_score: Decimal::ZERO,
        fraud_score: Decimal::ZERO,
        status: AccountStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

fn open_call(to_number: &str) -> Call {
    let now = Utc::now();
    Call {
        id: Uuid::new_v4(),
        from_number: "15550100001".to_string(),
        to_number: to_number.to_string(),
        status: CallStatus::Pending,
        direction: CallDirection::Inbound,
        buyer_id: None,
        seller_id: Some(100),
        geography: Some("US-TX".to_string()),
        call_type: Some("insurance".to_string()),
        keywords: vec![],
        start_time: now,
        end_time: None,
        duration_secs: None,
        cost: None,
        termination_cause: None,
        created_at: now,
        updated_at: now,
    }
}

fn place_bid(call_id: Uuid, buyer_id: i64, amount: Money, placed_offset_ms: i64) -> PlaceBid {
    let now = Utc::now();
    // placement times anchor a few seconds back so staggered offsets
    // still precede record creation
    let base = now - Duration::seconds(5);
    PlaceBid {
        call_id,
        buyer_id,
        seller_id: Some(100),
        auction_id: None,
        amount,
        criteria: BidCriteria::default(),
        quality: Decimal::ZERO,
        placed_at: base + Duration::milliseconds(placed_offset_ms),
        expires_at: now + Duration::seconds(300),
    }
}

fn engine_over(store: &Arc<MemoryStore>, gate: Arc<dyn ComplianceGate>) -> AuctionEngine {
    let ledger = Arc::new(Ledger::new(store.clone()));
    AuctionEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        ledger,
        gate,
        AuctionConfig::default(),
    )
}

fn engine(store: &Arc<MemoryStore>) -> AuctionEngine {
    engine_over(store, Arc::new(CompositeGate::default()))
}

async fn seed_call(store: &Arc<MemoryStore>, call: &Call) {
    CallRepository::create(store.as_ref(), call).await.unwrap();
}

async fn bid_status(store: &Arc<MemoryStore>, id: Uuid) -> BidStatus {
    BidRepository::find_by_id(store.as_ref(), id)
        .await
        .unwrap()
        .unwrap()
        .status
}

// Three competing bids rank highest-amount-first and settlement crowns
// the top of the order.
#[tokio::test]
async fn settle_picks_highest_bid_and_marks_losers() {
    let store = Arc::new(MemoryStore::new());
    for buyer in 1..=3 {
        store.insert_account(account(buyer, usd(dec!(100)), usd(dec!(0))));
    }
    let call = open_call("15550200002");
    seed_call(&store, &call).await;

    let engine = engine(&store);
    let b1 = engine
        .place_bid(place_bid(call.id, 1, usd(dec!(10)), 0))
        .await
        .unwrap();
    let b2 = engine
        .place_bid(place_bid(call.id, 2, usd(dec!(25)), 10))
        .await
        .unwrap();
    let b3 = engine
        .place_bid(place_bid(call.id, 3, usd(dec!(15)), 20))
        .await
        .unwrap();

    let ranked = engine.rank_active_bids(call.id).await.unwrap();
    let ranked_ids: Vec<Uuid> = ranked.iter().map(|b| b.id).collect();
    assert_eq!(ranked_ids, vec![b2.id, b3.id, b1.id]);
    assert_eq!(ranked[0].rank, Some(0));
    assert_eq!(ranked[2].rank, Some(2));

    // ranking is deterministic until the eligible set changes
    let again: Vec<Uuid> = engine
        .rank_active_bids(call.id)
        .await
        .unwrap()
        .iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(again, ranked_ids);

    let settlement = engine.settle(call.id).await.unwrap();
    assert_eq!(settlement.winning_bid.id, b2.id);
    assert_eq!(settlement.winning_bid.status, BidStatus::Won);
    assert!(settlement.winning_bid.accepted_at.is_some());
    assert_eq!(settlement.call.buyer_id, Some(2));
    assert_eq!(settlement.call.status, CallStatus::Queued);

    assert_eq!(bid_status(&store, b1.id).await, BidStatus::Lost);
    assert_eq!(bid_status(&store, b3.id).await, BidStatus::Lost);

    // winner debited, with a matching audit entry
    assert_eq!(store.get_balance(2).await.unwrap(), usd(dec!(75)));
    let entries = store.entries(2, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta, usd(dec!(-25)));
    assert_eq!(entries[0].balance_after, usd(dec!(75)));
    assert!(entries[0].reason.contains(&call.id.to_string()));

    // losers untouched
    assert_eq!(store.get_balance(1).await.unwrap(), usd(dec!(100)));
    assert_eq!(store.get_balance(3).await.unwrap(), usd(dec!(100)));
}

// Concurrent settles on one pending call: exactly one winner, everyone
// else observes AlreadyAssigned.
#[tokio::test]
async fn concurrent_settles_produce_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    for buyer in 1..=4 {
        store.insert_account(account(buyer, usd(dec!(100)), usd(dec!(0))));
    }
    let call = open_call("15550200003");
    seed_call(&store, &call).await;

    let engine = Arc::new(engine(&store));
    for buyer in 1..=4 {
        engine
            .place_bid(place_bid(
                call.id,
                buyer,
                usd(Decimal::from(10 + buyer)),
                buyer * 5,
            ))
            .await
            .unwrap();
    }

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let call_id = call.id;
            tokio::spawn(async move { engine.settle(call_id).await })
        })
        .collect();

    let mut wins = 0;
    let mut already_assigned = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => wins += 1,
            Err(AppError::AlreadyAssigned(_)) => already_assigned += 1,
            Err(e) => panic!("unexpected settlement error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(already_assigned, 7);

    // exactly one bid won, the rest lost
    let bids = BidRepository::find_for_call(store.as_ref(), call.id)
        .await
        .unwrap();
    let won: Vec<&Bid> = bids.iter().filter(|b| b.status == BidStatus::Won).collect();
    assert_eq!(won.len(), 1);
    assert!(bids
        .iter()
        .filter(|b| b.id != won[0].id)
        .all(|b| b.status == BidStatus::Lost));

    let call = CallRepository::find_by_id(store.as_ref(), call.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(call.buyer_id, Some(won[0].buyer_id));
}

// Balance $0, credit limit $100, two concurrent -$80 debits: exactly
// one commits, the other would breach the floor.
#[tokio::test]
async fn concurrent_debits_respect_credit_limit() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(0)), usd(dec!(100))));
    let ledger = Arc::new(Ledger::new(store.clone()));

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.apply_delta(1, usd(dec!(-80)), "debit race").await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| {
            matches!(r, Err(e) if e.error_code() == "insufficient_balance")
        })
        .count();
    assert_eq!(ok, 1);
    assert_eq!(rejected, 1);

    assert_eq!(store.get_balance(1).await.unwrap(), usd(dec!(-80)));
    // exactly one audit entry for the one committed mutation
    assert_eq!(store.entries(1, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn audit_trail_is_complete_and_chained() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(0)), usd(dec!(50))));
    let ledger = Ledger::new(store.clone());

    let deltas = [dec!(20), dec!(-35), dec!(5), dec!(-10)];
    for (i, d) in deltas.iter().enumerate() {
        ledger
            .apply_delta(1, usd(*d), &format!("step {i}"))
            .await
            .unwrap();
    }

    let mut entries = ledger.entries(1, 10).await.unwrap();
    entries.reverse(); // oldest first
    assert_eq!(entries.len(), deltas.len());

    let mut running = usd(dec!(0));
    for (entry, delta) in entries.iter().zip(deltas.iter()) {
        running = running.checked_add(&usd(*delta)).unwrap();
        assert_eq!(entry.delta, usd(*delta));
        assert_eq!(entry.balance_after, running);
    }
    assert_eq!(ledger.get_balance(1).await.unwrap(), running);
}

// An expired bid is swept, never settles, and the sweep leaves
// terminal bids alone.
#[tokio::test]
async fn expired_bids_are_swept_and_never_win() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(100)), usd(dec!(0))));
    let call = open_call("15550200004");
    seed_call(&store, &call).await;

    let engine = engine(&store);
    let bid = engine
        .place_bid(place_bid(call.id, 1, usd(dec!(10)), 0))
        .await
        .unwrap();

    // push the bid past its window
    let stale = Bid {
        expires_at: Utc::now() - Duration::seconds(1),
        ..bid.clone()
    };
    BidRepository::create(store.as_ref(), &stale).await.unwrap();

    // a terminal bid on another call must not be touched by the sweep
    let other_call = open_call("15550200005");
    seed_call(&store, &other_call).await;
    let won_bid = Bid {
        id: Uuid::new_v4(),
        call_id: other_call.id,
        status: BidStatus::Won,
        expires_at: Utc::now() - Duration::seconds(1),
        ..bid.clone()
    };
    BidRepository::create(store.as_ref(), &won_bid).await.unwrap();

    assert_eq!(engine.sweep_expired(Utc::now()).await.unwrap(), 1);
    assert_eq!(bid_status(&store, bid.id).await, BidStatus::Expired);
    assert_eq!(bid_status(&store, won_bid.id).await, BidStatus::Won);

    match engine.settle(call.id).await {
        Err(AppError::NoEligibleBids(_)) => {}
        other => panic!("expected NoEligibleBids, got {other:?}"),
    }
    assert_eq!(bid_status(&store, bid.id).await, BidStatus::Expired);
}

/// Ledger wrapper that refuses the first debit for one account,
/// simulating credit drying up between ranking and settlement.
struct VetoFirstDebit {
    inner: Arc<MemoryStore>,
    veto_account: i64,
    used: AtomicBool,
}

#[async_trait]
impl LedgerStore for VetoFirstDebit {
    async fn apply_delta(
        &self,
        account_id: i64,
        delta: Money,
        reason: &str,
    ) -> Result<LedgerApplied, AppError> {
        if account_id == self.veto_account && !self.used.swap(true, Ordering::SeqCst) {
            return Err(AppError::InsufficientBalance {
                required: delta.abs().to_string(),
                available: "0".to_string(),
            });
        }
        self.inner.apply_delta(account_id, delta, reason).await
    }

    async fn get_balance(&self, account_id: i64) -> Result<Money, AppError> {
        self.inner.get_balance(account_id).await
    }

    async fn entries(&self, account_id: i64, limit: i64) -> Result<Vec<ringbid_core::models::LedgerEntry>, AppError> {
        self.inner.entries(account_id, limit).await
    }
}

// A settlement whose debit fails compensates and crowns the runner-up.
#[tokio::test]
async fn failed_debit_compensates_and_tries_next_candidate() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(100)), usd(dec!(0))));
    store.insert_account(account(2, usd(dec!(100)), usd(dec!(0))));
    let call = open_call("15550200006");
    seed_call(&store, &call).await;

    let ledger = Arc::new(Ledger::new(Arc::new(VetoFirstDebit {
        inner: store.clone(),
        veto_account: 1,
        used: AtomicBool::new(false),
    })));
    let engine = AuctionEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        ledger,
        Arc::new(CompositeGate::default()),
        AuctionConfig::default(),
    );

    let top = engine
        .place_bid(place_bid(call.id, 1, usd(dec!(30)), 0))
        .await
        .unwrap();
    let runner_up = engine
        .place_bid(place_bid(call.id, 2, usd(dec!(20)), 10))
        .await
        .unwrap();

    let settlement = engine.settle(call.id).await.unwrap();
    assert_eq!(settlement.winning_bid.id, runner_up.id);
    assert_eq!(settlement.call.buyer_id, Some(2));

    // the vetoed candidate backed out cleanly: no money moved, bid lost
    assert_eq!(bid_status(&store, top.id).await, BidStatus::Lost);
    assert_eq!(store.get_balance(1).await.unwrap(), usd(dec!(100)));
    assert!(store.entries(1, 10).await.unwrap().is_empty());

    assert_eq!(store.get_balance(2).await.unwrap(), usd(dec!(80)));
}

#[tokio::test]
async fn dnc_number_suppresses_the_auction() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(100)), usd(dec!(0))));
    let call = open_call("1-555-020-0007");
    seed_call(&store, &call).await;

    let gate = CompositeGate::new(vec![Arc::new(DncListGate::new(["15550200007"]))]);
    let engine = engine_over(&store, Arc::new(gate));

    let bid = engine
        .place_bid(place_bid(call.id, 1, usd(dec!(10)), 0))
        .await
        .unwrap();

    assert!(engine.rank_active_bids(call.id).await.unwrap().is_empty());
    match engine.settle(call.id).await {
        Err(AppError::NoEligibleBids(_)) => {}
        other => panic!("expected NoEligibleBids, got {other:?}"),
    }
    // the bid stays eligible for compliant calls, it is not consumed
    assert_eq!(bid_status(&store, bid.id).await, BidStatus::Active);
}

#[tokio::test]
async fn unaffordable_bids_are_not_eligible() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(5)), usd(dec!(0))));
    store.insert_account(account(2, usd(dec!(100)), usd(dec!(0))));
    let call = open_call("15550200008");
    seed_call(&store, &call).await;

    let engine = engine(&store);
    engine
        .place_bid(place_bid(call.id, 1, usd(dec!(50)), 0))
        .await
        .unwrap();
    let affordable = engine
        .place_bid(place_bid(call.id, 2, usd(dec!(10)), 10))
        .await
        .unwrap();

    let ranked = engine.rank_active_bids(call.id).await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].id, affordable.id);

    let settlement = engine.settle(call.id).await.unwrap();
    assert_eq!(settlement.winning_bid.id, affordable.id);
}

#[tokio::test]
async fn placed_bid_reads_back_identically() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(100)), usd(dec!(0))));
    let call = open_call("15550200009");
    seed_call(&store, &call).await;

    let engine = engine(&store);
    let mut cmd = place_bid(call.id, 1, usd(dec!(12.34)), 0);
    cmd.criteria = BidCriteria {
        geographies: vec!["US-TX".to_string()],
        excluded_keywords: vec!["litigation".to_string()],
        ..Default::default()
    };

    let placed = engine.place_bid(cmd.clone()).await.unwrap();
    let read = engine.get_bid(placed.id).await.unwrap();
    assert_eq!(read.amount, cmd.amount);
    assert_eq!(read.criteria, cmd.criteria);
    assert_eq!(read.status, BidStatus::Active);
}

#[tokio::test]
async fn cancel_bid_is_terminal_and_excluded() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(100)), usd(dec!(0))));
    let call = open_call("15550200010");
    seed_call(&store, &call).await;

    let engine = engine(&store);
    let bid = engine
        .place_bid(place_bid(call.id, 1, usd(dec!(10)), 0))
        .await
        .unwrap();

    let canceled = engine.cancel_bid(bid.id).await.unwrap();
    assert_eq!(canceled.status, BidStatus::Canceled);

    // canceling twice conflicts, and the bid never settles
    match engine.cancel_bid(bid.id).await {
        Err(AppError::StatusConflict { .. }) => {}
        other => panic!("expected StatusConflict, got {other:?}"),
    }
    match engine.settle(call.id).await {
        Err(AppError::NoEligibleBids(_)) => {}
        other => panic!("expected NoEligibleBids, got {other:?}"),
    }
}

#[tokio::test]
async fn place_bid_validation_rejects_before_any_write() {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(1, usd(dec!(100)), usd(dec!(0))));
    let call = open_call("15550200011");
    seed_call(&store, &call).await;

    let engine = engine(&store);

    let mut bad_amount = place_bid(call.id, 1, usd(dec!(0)), 0);
    bad_amount.amount = usd(dec!(0));
    assert!(matches!(
        engine.place_bid(bad_amount).await,
        Err(AppError::Validation(_))
    ));

    let unknown_call = place_bid(Uuid::new_v4(), 1, usd(dec!(10)), 0);
    assert!(matches!(
        engine.place_bid(unknown_call).await,
        Err(AppError::CallNotFound(_))
    ));

    let unknown_buyer = place_bid(call.id, 999, usd(dec!(10)), 0);
    assert!(matches!(
        engine.place_bid(unknown_buyer).await,
        Err(AppError::AccountNotFound(_))
    ));

    assert!(BidRepository::find_for_call(store.as_ref(), call.id)
        .await
        .unwrap()
        .is_empty());
}

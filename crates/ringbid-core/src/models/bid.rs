//! Bid model
//!
//! Buyer bids competing for calls in the auction. A bid moves through a
//! closed status machine; `Won`, `Lost`, `Expired`, and `Canceled` are
//! terminal and nothing transitions out of them.

use crate::models::money::Money;
use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Bid status enumeration
///
/// The string mapping is loss-free in both directions; no two states
/// collapse onto one storage value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    /// Placed, not yet entered into ranking
    Pending,
    /// Competing in the auction
    #[default]
    Active,
    /// Current rank-0 leader (display marker, not authoritative)
    Winning,
    /// Won its call's auction
    Won,
    /// Another bid won the call
    Lost,
    /// Expiry window passed before settlement
    Expired,
    /// Withdrawn by the buyer
    Canceled,
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidStatus::Pending => write!(f, "pending"),
            BidStatus::Active => write!(f, "active"),
            BidStatus::Winning => write!(f, "winning"),
            BidStatus::Won => write!(f, "won"),
            BidStatus::Lost => write!(f, "lost"),
            BidStatus::Expired => write!(f, "expired"),
            BidStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl BidStatus {
    /// All states, in lifecycle order
    pub const ALL: [BidStatus; 7] = [
        BidStatus::Pending,
        BidStatus::Active,
        BidStatus::Winning,
        BidStatus::Won,
        BidStatus::Lost,
        BidStatus::Expired,
        BidStatus::Canceled,
    ];

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BidStatus::Pending),
            "active" => Some(BidStatus::Active),
            "winning" => Some(BidStatus::Winning),
            "won" => Some(BidStatus::Won),
            "lost" => Some(BidStatus::Lost),
            "expired" => Some(BidStatus::Expired),
            "canceled" => Some(BidStatus::Canceled),
            _ => None,
        }
    }

    /// No transitions leave a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BidStatus::Won | BidStatus::Lost | BidStatus::Expired | BidStatus::Canceled
        )
    }

    /// States the expiration sweep may move to `Expired`
    pub fn is_expirable(&self) -> bool {
        matches!(
            self,
            BidStatus::Pending | BidStatus::Active | BidStatus::Winning
        )
    }

    /// States settlement may promote to `Won`
    pub fn is_settle_eligible(&self) -> bool {
        matches!(self, BidStatus::Active | BidStatus::Winning)
    }
}

/// Buyer-supplied matching constraints
///
/// Purely descriptive: the auction engine evaluates these against a
/// call's attributes; nothing here is self-enforcing. Empty lists mean
/// "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BidCriteria {
    /// Acceptable call geographies (region codes); empty = any
    #[serde(default)]
    pub geographies: Vec<String>,

    /// Acceptable call-type tags; empty = any
    #[serde(default)]
    pub call_types: Vec<String>,

    /// Keywords that disqualify a call
    #[serde(default)]
    pub excluded_keywords: Vec<String>,

    /// Start of the buyer's acceptable local time-of-day window
    pub window_start: Option<NaiveTime>,

    /// End of the buyer's acceptable local time-of-day window
    pub window_end: Option<NaiveTime>,

    /// Buyer-local offset from UTC, in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Per-call spend ceiling
    pub max_budget: Option<Money>,
}

/// Bid entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    /// Unique identifier
    pub id: Uuid,

    /// Call the bid competes for
    pub call_id: Uuid,

    /// Bidding buyer account
    pub buyer_id: i64,

    /// Originating seller account, when known
    pub seller_id: Option<i64>,

    /// Auction grouping identifier
    pub auction_id: Option<Uuid>,

    /// Offered amount; always positive
    pub amount: Money,

    /// Current status
    pub status: BidStatus,

    /// 0-based position in the last computed ranking (display cache,
    /// recomputed by the auction engine, never authoritative)
    pub rank: Option<i32>,

    /// Matching constraints
    pub criteria: BidCriteria,

    /// Buyer quality score snapshot
    pub quality: Decimal,

    /// When the buyer placed the bid
    pub placed_at: DateTime<Utc>,

    /// When the bid stops being eligible
    pub expires_at: DateTime<Utc>,

    /// Set when the bid wins settlement
    pub accepted_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    /// Check if the eligibility window has passed
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn validate_positive_amount(amount: &Money) -> Result<(), ValidationError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(ValidationError::new("amount_not_positive"))
    }
}

fn validate_place_bid(cmd: &PlaceBid) -> Result<(), ValidationError> {
    if cmd.call_id.is_nil() {
        return Err(ValidationError::new("nil_call_id"));
    }
    if cmd.buyer_id <= 0 {
        return Err(ValidationError::new("nil_buyer_id"));
    }
    if cmd.expires_at <= cmd.placed_at {
        return Err(ValidationError::new("expires_before_placement"));
    }
    Ok(())
}

/// Bid placement command
///
/// Validated synchronously before any write; a rejected command has no
/// side effects.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_place_bid"))]
pub struct PlaceBid {
    pub call_id: Uuid,

    pub buyer_id: i64,

    pub seller_id: Option<i64>,

    pub auction_id: Option<Uuid>,

    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Money,

    #[serde(default)]
    pub criteria: BidCriteria,

    #[serde(default)]
    pub quality: Decimal,

    pub placed_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl PlaceBid {
    /// Build the bid record inserted on placement
    pub fn into_bid(self, now: DateTime<Utc>) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            call_id: self.call_id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            auction_id: self.auction_id,
            amount: self.amount,
            status: BidStatus::Active,
            rank: None,
            criteria: self.criteria,
            quality: self.quality,
            placed_at: self.placed_at,
            expires_at: self.expires_at,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

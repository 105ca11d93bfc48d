//! Account model
//!
//! Buyer and seller accounts on the exchange. Balances are mutated only
//! through the Ledger; every other component treats accounts as
//! read-only.

use crate::models::money::Money;
use crate::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Active account - can place bids and receive calls
    #[default]
    Active,
    /// Suspended account - temporarily blocked
    Suspended,
    /// Closed account - permanently deactivated, never deleted
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Suspended => write!(f, "suspended"),
            AccountStatus::Closed => write!(f, "closed"),
        }
    }
}

impl AccountStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            "closed" => Some(AccountStatus::Closed),
            _ => None,
        }
    }

    /// Check if the account may participate in auctions
    pub fn can_transact(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

/// Account entity
///
/// Provisioning and attribute management live outside the core; the
/// Ledger owns `balance` exclusively and enforces
/// `balance >= -credit_limit` on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: i64,

    /// Current balance (may be negative down to -credit_limit)
    pub balance: Money,

    /// Credit limit; the balance floor is its negation
    pub credit_limit: Money,

    /// Marketplace quality score
    pub quality_score: Decimal,

    /// Fraud risk score
    pub fraud_score: Decimal,

    /// Account status
    pub status: AccountStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Check if account is active
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.can_transact()
    }

    /// Spending headroom: balance + credit_limit
    ///
    /// Used by the auction engine for bid affordability checks. Display
    /// reads of this value may be stale; authoritative checks happen
    /// under the Ledger's row lock.
    pub fn available_balance(&self) -> AppResult<Money> {
        self.balance.checked_add(&self.credit_limit)
    }

    /// Pure invariant check shared by every ledger store implementation.
    ///
    /// Computes the balance after applying `delta`, failing with
    /// `InsufficientBalance` when the result would drop below
    /// `-credit_limit`. Currencies of all three values must agree.
    pub fn check_delta(balance: &Money, credit_limit: &Money, delta: &Money) -> AppResult<Money> {
        let new_balance = balance.checked_add(delta)?;
        let floor = credit_limit.negated();
        if new_balance.try_lt(&floor)? {
            let available = balance.checked_add(credit_limit)?;
            return Err(AppError::InsufficientBalance {
                required: delta.abs().to_string(),
                available: available.to_string(),
            });
        }
        Ok(new_balance)
    }
}

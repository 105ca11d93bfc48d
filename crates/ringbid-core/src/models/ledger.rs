//! Ledger entry and reconciliation models
//!
//! The audit trail of every balance mutation. Entries are append-only:
//! nothing in the core updates or deletes a row once written.

use crate::models::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Balance increased
    Credit,
    /// Balance decreased
    Debit,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Credit => write!(f, "credit"),
            EntryKind::Debit => write!(f, "debit"),
        }
    }
}

impl EntryKind {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "credit" => Some(EntryKind::Credit),
            "debit" => Some(EntryKind::Debit),
            _ => None,
        }
    }

    /// Kind implied by the sign of a delta
    pub fn from_delta(delta: &Money) -> Self {
        if delta.is_negative() {
            EntryKind::Debit
        } else {
            EntryKind::Credit
        }
    }
}

/// Immutable audit record of one committed balance mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier
    pub id: Uuid,

    /// Account whose balance changed
    pub account_id: i64,

    /// Applied delta (negative for debits)
    pub delta: Money,

    /// Balance immediately after the mutation
    pub balance_after: Money,

    /// Credit or debit
    pub kind: EntryKind,

    /// Why the balance changed
    pub reason: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build the entry for a committed mutation
    pub fn record(account_id: i64, delta: Money, balance_after: Money, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind: EntryKind::from_delta(&delta),
            delta,
            balance_after,
            reason,
            created_at: Utc::now(),
        }
    }
}

/// Observable signal for a balance mutation whose audit write failed
///
/// The balance change itself committed; the missing entry must be
/// replayed by an out-of-band reconciliation job. Never dropped
/// silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationFlag {
    pub account_id: i64,
    pub delta: Money,
    pub balance_after: Money,
    pub reason: String,
    /// The audit-write failure that triggered the flag
    pub error: String,
    pub flagged_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::money::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_from_delta() {
        let credit = Money::new(dec!(5.00), Currency::USD);
        let debit = Money::new(dec!(-5.00), Currency::USD);
        assert_eq!(EntryKind::from_delta(&credit), EntryKind::Credit);
        assert_eq!(EntryKind::from_delta(&debit), EntryKind::Debit);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [EntryKind::Credit, EntryKind::Debit] {
            assert_eq!(EntryKind::from_str(&kind.to_string()), Some(kind));
        }
    }

    #[test]
    fn test_record_sets_kind_and_id() {
        let delta = Money::new(dec!(-2.50), Currency::USD);
        let after = Money::new(dec!(7.50), Currency::USD);
        let entry = LedgerEntry::record(7, delta, after, "auction settlement".to_string());
        assert_eq!(entry.kind, EntryKind::Debit);
        assert_eq!(entry.account_id, 7);
        assert_eq!(entry.balance_after, after);
    }
}

//! Domain models for Ringbid
//!
//! This module contains all the core domain models used throughout the
//! exchange.

pub mod account;
pub mod bid;
pub mod call;
pub mod ledger;
pub mod money;

pub use account::{Account, AccountStatus};
pub use bid::{Bid, BidCriteria, BidStatus, PlaceBid};
pub use call::{Call, CallDirection, CallStatus, TerminationCause};
pub use ledger::{EntryKind, LedgerEntry, ReconciliationFlag};
pub use money::{Currency, Money};

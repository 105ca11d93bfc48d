//! Ringbid Engine
//!
//! Business logic of the exchange core, orchestrating the storage
//! traits from `ringbid-core`:
//!
//! - `Ledger` - atomic balance mutation with bounded conflict retry and
//!   an observable reconciliation signal
//! - `AuctionEngine` - bid placement, ranking, settlement, expiration
//! - Compliance gates (DNC list, TCPA calling hours)
//! - `ExpirationSweeper` - periodic bid expiration
//!
//! Services own their dependencies behind `Arc` and are safe to share
//! across tasks; every operation re-reads persisted state before
//! deciding.

pub mod auction;
pub mod compliance;
pub mod criteria;
pub mod ledger;
pub mod retry;
pub mod sweeper;

pub use auction::{AuctionEngine, Settlement, UnboundedCapacity};
pub use compliance::{CompositeGate, DncListGate, TcpaHoursGate};
pub use ledger::Ledger;
pub use retry::RetryPolicy;
pub use sweeper::ExpirationSweeper;

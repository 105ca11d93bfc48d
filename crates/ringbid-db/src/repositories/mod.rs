//! Repository implementations
//!
//! Concrete implementations of the storage traits defined in
//! ringbid-core, using sqlx for PostgreSQL access.

pub mod bid_repo;
pub mod call_repo;
pub mod ledger_repo;

pub use bid_repo::PgBidRepository;
pub use call_repo::PgCallRepository;
pub use ledger_repo::PgLedgerRepository;

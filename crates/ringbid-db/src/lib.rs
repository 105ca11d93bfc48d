//! Ringbid Storage Layer
//!
//! This crate provides the storage implementations behind the trait
//! interfaces in `ringbid-core`:
//!
//! - PostgreSQL repositories built on sqlx, with row-level locking for
//!   ledger mutations and conditional updates for status CAS
//! - Connection pool management
//! - An in-memory store with identical semantics, used by engine tests
//!   and embeddable deployments

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::MemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use ringbid_core::{AppError, AppResult};
pub use sqlx::PgPool;

//! Ringbid Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Ringbid call exchange. It includes:
//!
//! - Domain models (Money, Account, Bid, Call, LedgerEntry)
//! - Common traits for stores, compliance gates, and matching policies
//! - Unified error handling
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

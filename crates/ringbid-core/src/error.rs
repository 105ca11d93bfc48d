//! Unified error handling for Ringbid
//!
//! All failures in the exchange core are expressed through [`AppError`].
//! The taxonomy distinguishes validation rejections, business-rule
//! invariant violations, transient concurrency conflicts, not-found
//! lookups, and storage/external failures, so callers can decide between
//! retry, abort, and surface-to-user without string matching.

use thiserror::Error;

/// Main application error type
///
/// All errors in the exchange core should be converted to this type.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Storage Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Invariant Violations ====================
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    // ==================== Concurrency Conflicts ====================
    /// A conditional status update found a different current state.
    #[error("Status conflict on {entity} {id}")]
    StatusConflict { entity: &'static str, id: String },

    /// A serialization failure or lock timeout; safe to retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Auction Outcomes ====================
    #[error("No eligible bids for call {0}")]
    NoEligibleBids(String),

    #[error("Call already assigned: {0}")]
    AlreadyAssigned(String),

    // ==================== Not Found ====================
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Bid not found: {0}")]
    BidNotFound(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== External Dependencies ====================
    /// Compliance lookup could not be completed. Call sites must treat
    /// this as "not allowed" (fail closed), never as permission.
    #[error("Compliance check unavailable: {0}")]
    ComplianceUnavailable(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the stable error code for logs and API layers
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::CurrencyMismatch { .. } => "currency_mismatch",
            AppError::StatusConflict { .. } => "status_conflict",
            AppError::Conflict(_) => "conflict",
            AppError::NoEligibleBids(_) => "no_eligible_bids",
            AppError::AlreadyAssigned(_) => "already_assigned",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::BidNotFound(_) => "bid_not_found",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::ComplianceUnavailable(_) => "compliance_unavailable",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// True for transient failures the caller may retry with backoff.
    ///
    /// Validation errors and invariant violations are definitive and must
    /// never be retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Conflict(_) | AppError::StatusConflict { .. }
        )
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

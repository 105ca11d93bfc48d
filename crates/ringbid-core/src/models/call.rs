//! Call model
//!
//! Calls flowing through the exchange. Status changes go through the
//! compare-and-swap transition path; the unconditional update path is
//! reserved for non-status metadata.

use crate::models::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Call status enumeration
///
/// `Failed` absorbs cancellation and `NoAnswer` absorbs busy: the
/// collapsed terminal set is intentional, and the finer distinction is
/// carried in [`TerminationCause`], not in status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Awaiting auction assignment (or pre-assigned, awaiting routing)
    #[default]
    Pending,
    /// Assigned to a buyer, queued for delivery
    Queued,
    /// Ringing at the buyer's endpoint
    Ringing,
    /// Connected
    InProgress,
    /// Ended normally
    Completed,
    /// Ended abnormally (includes cancellation)
    Failed,
    /// Never connected (includes busy)
    NoAnswer,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Pending => write!(f, "pending"),
            CallStatus::Queued => write!(f, "queued"),
            CallStatus::Ringing => write!(f, "ringing"),
            CallStatus::InProgress => write!(f, "in_progress"),
            CallStatus::Completed => write!(f, "completed"),
            CallStatus::Failed => write!(f, "failed"),
            CallStatus::NoAnswer => write!(f, "no_answer"),
        }
    }
}

impl CallStatus {
    /// All states, in lifecycle order
    pub const ALL: [CallStatus; 7] = [
        CallStatus::Pending,
        CallStatus::Queued,
        CallStatus::Ringing,
        CallStatus::InProgress,
        CallStatus::Completed,
        CallStatus::Failed,
        CallStatus::NoAnswer,
    ];

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(CallStatus::Pending),
            "queued" => Some(CallStatus::Queued),
            "ringing" => Some(CallStatus::Ringing),
            "in_progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            "no_answer" => Some(CallStatus::NoAnswer),
            _ => None,
        }
    }

    /// No transitions leave a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::NoAnswer
        )
    }

    /// Legal edges of the state machine
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        match self {
            CallStatus::Pending => matches!(next, CallStatus::Queued | CallStatus::Ringing),
            CallStatus::Queued | CallStatus::Ringing => matches!(
                next,
                CallStatus::InProgress
                    | CallStatus::Failed
                    | CallStatus::NoAnswer
                    // settlement compensation returns an assigned call to the pool
                    | CallStatus::Pending
            ),
            CallStatus::InProgress => matches!(
                next,
                CallStatus::Completed | CallStatus::Failed | CallStatus::NoAnswer
            ),
            CallStatus::Completed | CallStatus::Failed | CallStatus::NoAnswer => false,
        }
    }
}

/// Finer-grained termination detail than the status enum carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    NormalClearing,
    Canceled,
    Busy,
    Rejected,
    Timeout,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::NormalClearing => write!(f, "normal_clearing"),
            TerminationCause::Canceled => write!(f, "canceled"),
            TerminationCause::Busy => write!(f, "busy"),
            TerminationCause::Rejected => write!(f, "rejected"),
            TerminationCause::Timeout => write!(f, "timeout"),
        }
    }
}

impl TerminationCause {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal_clearing" => Some(TerminationCause::NormalClearing),
            "canceled" => Some(TerminationCause::Canceled),
            "busy" => Some(TerminationCause::Busy),
            "rejected" => Some(TerminationCause::Rejected),
            "timeout" => Some(TerminationCause::Timeout),
            _ => None,
        }
    }

    /// The terminal status this cause collapses onto
    pub fn terminal_status(&self) -> CallStatus {
        match self {
            TerminationCause::NormalClearing => CallStatus::Completed,
            TerminationCause::Canceled | TerminationCause::Rejected | TerminationCause::Timeout => {
                CallStatus::Failed
            }
            TerminationCause::Busy => CallStatus::NoAnswer,
        }
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    #[default]
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Inbound => write!(f, "inbound"),
            CallDirection::Outbound => write!(f, "outbound"),
        }
    }
}

impl CallDirection {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inbound" => Some(CallDirection::Inbound),
            "outbound" => Some(CallDirection::Outbound),
            _ => None,
        }
    }
}

/// Call entity
///
/// `buyer_id` is absent while a marketplace call awaits auction
/// assignment. Calls are never physically deleted in normal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Unique identifier
    pub id: Uuid,

    /// Originating number (ANI)
    pub from_number: String,

    /// Destination number (DNIS)
    pub to_number: String,

    /// Current status
    pub status: CallStatus,

    /// Call direction
    pub direction: CallDirection,

    /// Assigned buyer, set by settlement
    pub buyer_id: Option<i64>,

    /// Originating seller
    pub seller_id: Option<i64>,

    /// Caller geography (region code), used for criteria matching
    pub geography: Option<String>,

    /// Call-type tag, used for criteria matching
    pub call_type: Option<String>,

    /// Descriptive keywords, used for exclusion matching
    pub keywords: Vec<String>,

    /// Call start timestamp
    pub start_time: DateTime<Utc>,

    /// Call end timestamp
    pub end_time: Option<DateTime<Utc>>,

    /// Total duration in seconds
    pub duration_secs: Option<i32>,

    /// Settled cost of the call
    pub cost: Option<Money>,

    /// Finer-grained termination detail
    pub termination_cause: Option<TerminationCause>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// Open for auction: pending with no buyer yet
    #[inline]
    pub fn is_open_for_auction(&self) -> bool {
        self.status == CallStatus::Pending && self.buyer_id.is_none()
    }

    /// Basic field invariants, checked before insert
    pub fn validate(&self) -> crate::AppResult<()> {
        if self.from_number.trim().is_empty() || self.to_number.trim().is_empty() {
            return Err(crate::AppError::Validation(
                "call numbers must be non-empty".to_string(),
            ));
        }
        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(crate::AppError::Validation(
                    "call end_time precedes start_time".to_string(),
                ));
            }
        }
        if matches!(self.duration_secs, Some(d) if d < 0) {
            return Err(crate::AppError::Validation(
                "call duration must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn call() -> Call {
        let now = Utc::now();
        Call {
            id: Uuid::new_v4(),
            from_number: "15551230001".to_string(),
            to_number: "15551230002".to_string(),
            status: CallStatus::Pending,
            direction: CallDirection::Inbound,
            buyer_id: None,
            seller_id: Some(1),
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

    #[test]
    fn test_status_round_trip_is_loss_free() {
        for status in CallStatus::ALL {
            assert_eq!(CallStatus::from_str(&status.to_string()), Some(status));
        }
    }

    #[test]
    fn test_transition_edges() {
        assert!(CallStatus::Pending.can_transition_to(CallStatus::Queued));
        assert!(CallStatus::Pending.can_transition_to(CallStatus::Ringing));
        assert!(!CallStatus::Pending.can_transition_to(CallStatus::InProgress));

        assert!(CallStatus::Queued.can_transition_to(CallStatus::InProgress));
        assert!(CallStatus::Queued.can_transition_to(CallStatus::Pending));
        assert!(CallStatus::InProgress.can_transition_to(CallStatus::Completed));

        for terminal in [CallStatus::Completed, CallStatus::Failed, CallStatus::NoAnswer] {
            assert!(terminal.is_terminal());
            for next in CallStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    // Pins the deliberate collapse: cancel lands on Failed, busy on
    // NoAnswer, while the cause keeps the original distinction.
    #[test]
    fn test_termination_cause_collapse() {
        assert_eq!(
            TerminationCause::Canceled.terminal_status(),
            CallStatus::Failed
        );
        assert_eq!(TerminationCause::Busy.terminal_status(), CallStatus::NoAnswer);
        assert_eq!(
            TerminationCause::NormalClearing.terminal_status(),
            CallStatus::Completed
        );
        // and the cause string round-trips without loss
        for cause in [
            TerminationCause::NormalClearing,
            TerminationCause::Canceled,
            TerminationCause::Busy,
            TerminationCause::Rejected,
            TerminationCause::Timeout,
        ] {
            assert_eq!(TerminationCause::from_str(&cause.to_string()), Some(cause));
        }
    }

    #[test]
    fn test_open_for_auction() {
        let mut c = call();
        assert!(c.is_open_for_auction());
        c.buyer_id = Some(9);
        assert!(!c.is_open_for_auction());
    }

    #[test]
    fn test_validate() {
        assert!(call().validate().is_ok());

        let mut c = call();
        c.to_number = "  ".to_string();
        assert!(c.validate().is_err());

        let mut c = call();
        c.end_time = Some(c.start_time - Duration::seconds(5));
        assert!(c.validate().is_err());

        let mut c = call();
        c.duration_secs = Some(-1);
        assert!(c.validate().is_err());
    }
}

//! Compliance gate adapters
//!
//! Boolean allow/deny checks consumed by the auction engine before a
//! bid/call pairing is finalized. The rule *sources* (DNC list
//! management, TCPA window configuration) live outside the core; these
//! adapters only answer "is this number allowed at this time".
//!
//! Callers treat a gate error as "not allowed" - an unavailable check
//! never silently permits a restricted call.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use ringbid_core::{config::ComplianceConfig, traits::ComplianceGate, AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Largest UTC offset in minutes (UTC+14 / UTC-12 bound both fit)
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Strip a phone number down to its digits for matching
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True when `at` falls inside the local time-of-day window
///
/// Windows may cross midnight (`start > end` wraps). An unrepresentable
/// offset answers `false` - out-of-range input never widens a window.
pub(crate) fn in_local_window(
    at: DateTime<Utc>,
    start: NaiveTime,
    end: NaiveTime,
    offset_minutes: i32,
) -> bool {
    if offset_minutes.abs() > MAX_OFFSET_MINUTES {
        return false;
    }
    let Some(offset) = FixedOffset::east_opt(offset_minutes * 60) else {
        return false;
    };
    let local = at.with_timezone(&offset).time();
    if start <= end {
        start <= local && local < end
    } else {
        local >= start || local < end
    }
}

/// Do-Not-Call list gate
///
/// Membership check against a normalized in-process number set; the set
/// itself is loaded by an external source.
pub struct DncListGate {
    numbers: HashSet<String>,
}

impl DncListGate {
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            numbers: numbers
                .into_iter()
                .map(|n| normalize_phone(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

#[async_trait]
impl ComplianceGate for DncListGate {
    async fn is_allowed(&self, phone_number: &str, _at: DateTime<Utc>) -> AppResult<bool> {
        let normalized = normalize_phone(phone_number);
        if normalized.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "phone number has no digits: {phone_number}"
            )));
        }
        let allowed = !self.numbers.contains(&normalized);
        if !allowed {
            debug!("number {} suppressed by DNC list", normalized);
        }
        Ok(allowed)
    }
}

/// TCPA calling-hours gate
///
/// Allows calls only inside a local time-of-day window.
pub struct TcpaHoursGate {
    start: NaiveTime,
    end: NaiveTime,
    offset_minutes: i32,
}

impl TcpaHoursGate {
    pub fn new(start: NaiveTime, end: NaiveTime, offset_minutes: i32) -> AppResult<Self> {
        if offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(AppError::Config(format!(
                "UTC offset out of range: {offset_minutes} minutes"
            )));
        }
        Ok(Self {
            start,
            end,
            offset_minutes,
        })
    }

    /// Build from application configuration ("HH:MM" window bounds)
    pub fn from_config(config: &ComplianceConfig) -> AppResult<Self> {
        let start = NaiveTime::parse_from_str(&config.window_start, "%H:%M")
            .map_err(|e| AppError::Config(format!("bad window_start: {e}")))?;
        let end = NaiveTime::parse_from_str(&config.window_end, "%H:%M")
            .map_err(|e| AppError::Config(format!("bad window_end: {e}")))?;
        Self::new(start, end, config.utc_offset_minutes)
    }
}

#[async_trait]
impl ComplianceGate for TcpaHoursGate {
    async fn is_allowed(&self, _phone_number: &str, at: DateTime<Utc>) -> AppResult<bool> {
        Ok(in_local_window(at, self.start, self.end, self.offset_minutes))
    }
}

/// Composite gate: every member must allow
///
/// An empty composite allows everything. Errors short-circuit so the
/// caller can fail closed.
#[derive(Default)]
pub struct CompositeGate {
    gates: Vec<Arc<dyn ComplianceGate>>,
}

impl CompositeGate {
    pub fn new(gates: Vec<Arc<dyn ComplianceGate>>) -> Self {
        Self { gates }
    }

    /// Standard production composition from configuration
    pub fn from_config(config: &ComplianceConfig) -> AppResult<Self> {
        Ok(Self::new(vec![
            Arc::new(DncListGate::new(config.dnc_numbers.iter())),
            Arc::new(TcpaHoursGate::from_config(config)?),
        ]))
    }
}

#[async_trait]
impl ComplianceGate for CompositeGate {
    async fn is_allowed(&self, phone_number: &str, at: DateTime<Utc>) -> AppResult<bool> {
        for gate in &self.gates {
            if !gate.is_allowed(phone_number, at).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

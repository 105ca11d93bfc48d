//! Call repository implementation
//!
//! PostgreSQL-backed storage for calls. Status changes apply through a
//! single conditional update carrying the assignment and terminal
//! fields; the unconditional path touches metadata only.

use chrono::{DateTime, Utc};
use ringbid_core::{
    models::{Call, CallDirection, CallStatus, Currency, Money, TerminationCause},
    traits::{CallAssignment, CallRepository},
    AppError, AppResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CALL_COLUMNS: &str = r#"
    id, from_number, to_number, status, direction,
    buyer_id, seller_id, geography, call_type, keywords,
    start_time, end_time, duration_secs,
    cost_amount, cost_currency, termination_cause,
    created_at, updated_at
"#;

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self, call))]
    async fn create(&self, call: &Call) -> AppResult<Call> {
        call.validate()?;

        debug!("Creating call {}", call.id);

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&format!(
            r#"
            INSERT INTO calls (
                id, from_number, to_number, status, direction,
                buyer_id, seller_id, geography, call_type, keywords,
                start_time, end_time, duration_secs,
                cost_amount, cost_currency, termination_cause
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(call.id)
        .bind(&call.from_number)
        .bind(&call.to_number)
        .bind(call.status.to_string())
        .bind(call.direction.to_string())
        .bind(call.buyer_id)
        .bind(call.seller_id)
        .bind(&call.geography)
        .bind(&call.call_type)
        .bind(&call.keywords)
        .bind(call.start_time)
        .bind(call.end_time)
        .bind(call.duration_secs)
        .bind(call.cost.map(|c| c.amount))
        .bind(call.cost.map(|c| c.currency.as_str().to_string()))
        .bind(call.termination_cause.map(|c| c.to_string()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating call: {}", e);
            AppError::Database(format!("Failed to create call: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Call>> {
        let result = sqlx::query_as::<sqlx::Postgres, CallRow>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding call {}: {}", id, e);
            AppError::Database(format!("Failed to find call: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, fields))]
    async fn transition_if_status(
        &self,
        id: Uuid,
        expected: CallStatus,
        next: CallStatus,
        fields: CallAssignment,
    ) -> AppResult<bool> {
        if !expected.can_transition_to(next) {
            return Err(AppError::InvalidInput(format!(
                "illegal call transition {} -> {}",
                expected, next
            )));
        }

        debug!("CAS call {} {} -> {}", id, expected, next);

        let result = sqlx::query(
            r#"
            UPDATE calls
            SET status = $3,
                buyer_id = $4,
                seller_id = $5,
                end_time = $6,
                duration_secs = $7,
                cost_amount = $8,
                cost_currency = $9,
                termination_cause = $10,
                updated_at = NOW()
            WHERE id = $1
              AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.to_string())
        .bind(next.to_string())
        .bind(fields.buyer_id)
        .bind(fields.seller_id)
        .bind(fields.end_time)
        .bind(fields.duration_secs)
        .bind(fields.cost.map(|c| c.amount))
        .bind(fields.cost.map(|c| c.currency.as_str().to_string()))
        .bind(fields.termination_cause.map(|c| c.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error on call CAS {}: {}", id, e);
            AppError::Database(format!("Failed to transition call: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, keywords))]
    async fn update_metadata(
        &self,
        id: Uuid,
        geography: Option<&str>,
        call_type: Option<&str>,
        keywords: &[String],
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET geography = $2,
                call_type = $3,
                keywords = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(geography)
        .bind(call_type)
        .bind(keywords)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating call metadata {}: {}", id, e);
            AppError::Database(format!("Failed to update call metadata: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::CallNotFound(id.to_string()));
        }

        Ok(())
    }
}

/// Helper struct for mapping call rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    from_number: String,
    to_number: String,
    status: String,
    direction: String,
    buyer_id: Option<i64>,
    seller_id: Option<i64>,
    geography: Option<String>,
    call_type: Option<String>,
    keywords: Vec<String>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    duration_secs: Option<i32>,
    cost_amount: Option<Decimal>,
    cost_currency: Option<String>,
    termination_cause: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CallRow> for Call {
    fn from(row: CallRow) -> Self {
        let cost = match (row.cost_amount, row.cost_currency.as_deref()) {
            (Some(amount), Some(code)) => Some(Money::new(
                amount,
                Currency::new(code).unwrap_or(Currency::USD),
            )),
            _ => None,
        };
        Self {
            id: row.id,
            from_number: row.from_number,
            to_number: row.to_number,
            status: CallStatus::from_str(&row.status).unwrap_or(CallStatus::Pending),
            direction: CallDirection::from_str(&row.direction).unwrap_or(CallDirection::Inbound),
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            geography: row.geography,
            call_type: row.call_type,
            keywords: row.keywords,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_secs: row.duration_secs,
            cost,
            termination_cause: row
                .termination_cause
                .as_deref()
                .and_then(TerminationCause::from_str),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

//! Bid repository implementation
//!
//! PostgreSQL-backed storage for bids. All status writes go through
//! conditional updates checked via affected-row count; a bid whose
//! status changed underneath a writer is left untouched.

use chrono::{DateTime, Utc};
use ringbid_core::{
    models::{Bid, BidCriteria, BidStatus, Currency, Money},
    traits::BidRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of BidRepository
pub struct PgBidRepository {
    pool: PgPool,
}

impl PgBidRepository {
    /// Create a new bid repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn status_strings(statuses: &[BidStatus]) -> Vec<String> {
        statuses.iter().map(|s| s.to_string()).collect()
    }
}

const BID_COLUMNS: &str = r#"
    id, call_id, buyer_id, seller_id, auction_id,
    amount, currency, status, rank, criteria, quality,
    placed_at, expires_at, accepted_at, created_at, updated_at
"#;

#[async_trait]
impl BidRepository for PgBidRepository {
    #[instrument(skip(self, bid))]
    async fn create(&self, bid: &Bid) -> AppResult<Bid> {
        debug!("Creating bid {} on call {}", bid.id, bid.call_id);

        let criteria = serde_json::to_value(&bid.criteria)?;

        let row = sqlx::query_as::<sqlx::Postgres, BidRow>(&format!(
            r#"
            INSERT INTO bids (
                id, call_id, buyer_id, seller_id, auction_id,
                amount, currency, status, rank, criteria, quality,
                placed_at, expires_at, accepted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {BID_COLUMNS}
            "#
        ))
        .bind(bid.id)
        .bind(bid.call_id)
        .bind(bid.buyer_id)
        .bind(bid.seller_id)
        .bind(bid.auction_id)
        .bind(bid.amount.amount)
        .bind(bid.amount.currency.as_str())
        .bind(bid.status.to_string())
        .bind(bid.rank)
        .bind(criteria)
        .bind(bid.quality)
        .bind(bid.placed_at)
        .bind(bid.expires_at)
        .bind(bid.accepted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating bid: {}", e);
            AppError::Database(format!("Failed to create bid: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Bid>> {
        let result = sqlx::query_as::<sqlx::Postgres, BidRow>(&format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding bid {}: {}", id, e);
            AppError::Database(format!("Failed to find bid: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_for_call(&self, call_id: Uuid) -> AppResult<Vec<Bid>> {
        let rows = sqlx::query_as::<sqlx::Postgres, BidRow>(&format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE call_id = $1 ORDER BY placed_at"
        ))
        .bind(call_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching bids for call {}: {}", call_id, e);
            AppError::Database(format!("Failed to fetch bids: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_open_for_call(&self, call_id: Uuid, now: DateTime<Utc>) -> AppResult<Vec<Bid>> {
        let rows = sqlx::query_as::<sqlx::Postgres, BidRow>(&format!(
            r#"
            SELECT {BID_COLUMNS}
            FROM bids
            WHERE call_id = $1
              AND status = ANY($2)
              AND expires_at > $3
            ORDER BY placed_at
            "#
        ))
        .bind(call_id)
        .bind(Self::status_strings(&[BidStatus::Active, BidStatus::Winning]))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching open bids: {}", e);
            AppError::Database(format!("Failed to fetch open bids: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: &[BidStatus],
        next: BidStatus,
        accepted_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        debug!("CAS bid {} {:?} -> {}", id, expected, next);

        let result = sqlx::query(
            r#"
            UPDATE bids
            SET status = $3,
                accepted_at = COALESCE($4, accepted_at),
                updated_at = NOW()
            WHERE id = $1
              AND status = ANY($2)
            "#,
        )
        .bind(id)
        .bind(Self::status_strings(expected))
        .bind(next.to_string())
        .bind(accepted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error on bid CAS {}: {}", id, e);
            AppError::Database(format!("Failed to update bid status: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn mark_losers(&self, call_id: Uuid, winner: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bids
            SET status = $4,
                updated_at = NOW()
            WHERE call_id = $1
              AND id <> $2
              AND status = ANY($3)
            "#,
        )
        .bind(call_id)
        .bind(winner)
        .bind(Self::status_strings(&[
            BidStatus::Pending,
            BidStatus::Active,
            BidStatus::Winning,
        ]))
        .bind(BidStatus::Lost.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking losers for call {}: {}", call_id, e);
            AppError::Database(format!("Failed to mark losing bids: {}", e))
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn restore_losers(&self, call_id: Uuid, skip: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bids
            SET status = $3,
                updated_at = NOW()
            WHERE call_id = $1
              AND id <> $2
              AND status = $4
            "#,
        )
        .bind(call_id)
        .bind(skip)
        .bind(BidStatus::Active.to_string())
        .bind(BidStatus::Lost.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error restoring bids for call {}: {}", call_id, e);
            AppError::Database(format!("Failed to restore losing bids: {}", e))
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, ranks))]
    async fn update_ranks(&self, ranks: &[(Uuid, i32)]) -> AppResult<()> {
        // Display cache only; a partial write is corrected by the next
        // ranking pass.
        for (id, rank) in ranks {
            sqlx::query("UPDATE bids SET rank = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(rank)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error updating rank for bid {}: {}", id, e);
                    AppError::Database(format!("Failed to update bid rank: {}", e))
                })?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sweep_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bids
            SET status = $3,
                updated_at = NOW()
            WHERE expires_at < $1
              AND status = ANY($2)
            "#,
        )
        .bind(before)
        .bind(Self::status_strings(&[
            BidStatus::Pending,
            BidStatus::Active,
            BidStatus::Winning,
        ]))
        .bind(BidStatus::Expired.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error expiring bids: {}", e);
            AppError::Database(format!("Failed to expire bids: {}", e))
        })?;

        let expired_count = result.rows_affected();

        if expired_count > 0 {
            warn!("Expired {} bids", expired_count);
        }

        Ok(expired_count)
    }
}

/// Helper struct for mapping bid rows
#[derive(Debug, sqlx::FromRow)]
struct BidRow {
    id: Uuid,
    call_id: Uuid,
    buyer_id: i64,
    seller_id: Option<i64>,
    auction_id: Option<Uuid>,
    amount: Decimal,
    currency: String,
    status: String,
    rank: Option<i32>,
    criteria: serde_json::Value,
    quality: Decimal,
    placed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BidRow> for Bid {
    fn from(row: BidRow) -> Self {
        let currency = Currency::new(&row.currency).unwrap_or(Currency::USD);
        let criteria: BidCriteria = serde_json::from_value(row.criteria).unwrap_or_default();
        Self {
            id: row.id,
            call_id: row.call_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            auction_id: row.auction_id,
            amount: Money::new(row.amount, currency),
            status: BidStatus::from_str(&row.status).unwrap_or(BidStatus::Active),
            rank: row.rank,
            criteria,
            quality: row.quality,
            placed_at: row.placed_at,
            expires_at: row.expires_at,
            accepted_at: row.accepted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

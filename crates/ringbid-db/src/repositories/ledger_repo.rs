//! Ledger repository implementation
//!
//! PostgreSQL-backed balance store. Every mutation runs as one
//! transaction: the account row is taken `FOR UPDATE`, the credit-limit
//! invariant is checked against the locked balance, and the audit entry
//! is appended under a savepoint so a failed audit write never blocks
//! the balance commit (it raises a reconciliation flag instead).

use chrono::{DateTime, Utc};
use ringbid_core::{
    models::{Account, AccountStatus, Currency, EntryKind, LedgerEntry, Money, ReconciliationFlag},
    traits::{AccountDirectory, LedgerApplied, LedgerStore},
    AppError, AppResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Acquire, PgPool};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of LedgerStore and AccountDirectory
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    /// Create a new ledger repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a sqlx error, surfacing serialization failures and lock timeouts
/// as retryable conflicts.
fn map_db_err(context: &str, e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db) = e {
        // 40001 serialization_failure, 40P01 deadlock_detected,
        // 55P03 lock_not_available
        if let Some(code) = db.code() {
            if code == "40001" || code == "40P01" || code == "55P03" {
                return AppError::Conflict(format!("{}: {}", context, e));
            }
        }
    }
    AppError::Database(format!("{}: {}", context, e))
}

#[async_trait]
impl LedgerStore for PgLedgerRepository {
    #[instrument(skip(self))]
    async fn apply_delta(
        &self,
        account_id: i64,
        delta: Money,
        reason: &str,
    ) -> AppResult<LedgerApplied> {
        debug!("Applying delta {} to account {}", delta, account_id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Exclusive row lock for the whole read-check-write-audit unit
        let row = sqlx::query_as::<sqlx::Postgres, AccountRow>(
            r#"
            SELECT id, balance, credit_limit, currency,
                   quality_score, fraud_score, status,
                   created_at, updated_at
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to lock account", e))?
        .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        let account: Account = row.into();

        if account.status == AccountStatus::Closed {
            return Err(AppError::Validation(format!(
                "account {} is closed",
                account_id
            )));
        }

        // Invariant check against the locked balance; nothing is applied
        // on failure
        let new_balance = Account::check_delta(&account.balance, &account.credit_limit, &delta)?;

        sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(new_balance.amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to update balance", e))?;

        let entry = LedgerEntry::record(account_id, delta, new_balance, reason.to_string());

        // Audit append under a savepoint: the balance mutation is
        // must-succeed durability, the audit row is best-effort and
        // flagged for out-of-band reconciliation when it fails.
        let mut written_entry = None;
        let mut reconciliation = None;
        match tx.begin().await {
            Ok(mut sp) => {
                let insert = sqlx::query(
                    r#"
                    INSERT INTO ledger_entries (
                        id, account_id, delta, balance_after,
                        currency, kind, reason, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(entry.id)
                .bind(entry.account_id)
                .bind(entry.delta.amount)
                .bind(entry.balance_after.amount)
                .bind(entry.delta.currency.as_str())
                .bind(entry.kind.to_string())
                .bind(&entry.reason)
                .bind(entry.created_at)
                .execute(&mut *sp)
                .await;

                match insert {
                    Ok(_) => match sp.commit().await {
                        Ok(_) => written_entry = Some(entry.clone()),
                        Err(e) => {
                            reconciliation = Some(make_flag(&entry, &e.to_string()));
                        }
                    },
                    Err(e) => {
                        let _ = sp.rollback().await;
                        reconciliation = Some(make_flag(&entry, &e.to_string()));
                    }
                }
            }
            Err(e) => {
                reconciliation = Some(make_flag(&entry, &e.to_string()));
            }
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            map_db_err("Failed to commit balance mutation", e)
        })?;

        if let Some(flag) = &reconciliation {
            warn!(
                account_id = flag.account_id,
                delta = %flag.delta,
                balance_after = %flag.balance_after,
                error = %flag.error,
                "Audit write failed; balance committed, entry flagged for reconciliation"
            );
        }

        Ok(LedgerApplied {
            new_balance,
            entry: written_entry,
            reconciliation,
        })
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, account_id: i64) -> AppResult<Money> {
        let row: Option<(Decimal, String)> =
            sqlx::query_as("SELECT balance, currency FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_db_err("Failed to read balance", e))?;

        let (balance, currency) =
            row.ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        Ok(Money::new(balance, parse_currency(&currency)))
    }

    #[instrument(skip(self))]
    async fn entries(&self, account_id: i64, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<sqlx::Postgres, LedgerEntryRow>(
            r#"
            SELECT id, account_id, delta, balance_after,
                   currency, kind, reason, created_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to fetch ledger entries", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl AccountDirectory for PgLedgerRepository {
    #[instrument(skip(self))]
    async fn get_account(&self, id: i64) -> AppResult<Option<Account>> {
        let result = sqlx::query_as::<sqlx::Postgres, AccountRow>(
            r#"
            SELECT id, balance, credit_limit, currency,
                   quality_score, fraud_score, status,
                   created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to find account", e))?;

        Ok(result.map(Into::into))
    }
}

fn make_flag(entry: &LedgerEntry, error: &str) -> ReconciliationFlag {
    ReconciliationFlag {
        account_id: entry.account_id,
        delta: entry.delta,
        balance_after: entry.balance_after,
        reason: entry.reason.clone(),
        error: error.to_string(),
        flagged_at: Utc::now(),
    }
}

fn parse_currency(code: &str) -> Currency {
    Currency::new(code).unwrap_or(Currency::USD)
}

/// Helper struct for mapping account rows
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    balance: Decimal,
    credit_limit: Decimal,
    currency: String,
    quality_score: Decimal,
    fraud_score: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let currency = parse_currency(&row.currency);
        Self {
            id: row.id,
            balance: Money::new(row.balance, currency),
            credit_limit: Money::new(row.credit_limit, currency),
            quality_score: row.quality_score,
            fraud_score: row.fraud_score,
            status: AccountStatus::from_str(&row.status).unwrap_or(AccountStatus::Active),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Helper struct for mapping ledger entry rows
#[derive(Debug, sqlx::FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    account_id: i64,
    delta: Decimal,
    balance_after: Decimal,
    currency: String,
    kind: String,
    reason: String,
    created_at: DateTime<Utc>,
}

impl From<LedgerEntryRow> for LedgerEntry {
    fn from(row: LedgerEntryRow) -> Self {
        let currency = parse_currency(&row.currency);
        Self {
            id: row.id,
            account_id: row.account_id,
            delta: Money::new(row.delta, currency),
            balance_after: Money::new(row.balance_after, currency),
            kind: EntryKind::from_str(&row.kind).unwrap_or(EntryKind::Credit),
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

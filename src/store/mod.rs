//! Ledger store: durable state for campaigns, recipients, and transactions.
//!
//! # Data Flow
//! ```text
//! engine/  ──atomic claims, settles, status flips──▶  store/
//!     campaigns.rs    → lifecycle status, aggregate counters, fees
//!     recipients.rs   → payout rows, batch settlement, admin retry
//!     transactions.rs → submitted-operation records
//! ```
//!
//! # Design Decisions
//! - Every read-then-write invariant is one sqlx transaction with a
//!   conditional `WHERE status = ?` predicate, never separate calls
//! - Aggregate counters are recomputed from the recipients table, never
//!   incremented, so retries and restarts cannot drift them
//! - Schema is created idempotently at startup; no migration machinery

pub mod campaigns;
pub mod recipients;
pub mod transactions;

pub use campaigns::NewCampaign;
pub use recipients::StatusCounts;
pub use transactions::NewTxRecord;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;

use crate::model::CampaignStatus;

/// Errors raised by the ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// A referenced row does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional status update matched nothing.
    #[error("campaign {id} is {actual}, expected {expected}")]
    StatusPrecondition {
        id: String,
        actual: CampaignStatus,
        expected: &'static str,
    },

    /// A stored numeric string failed to parse.
    #[error("corrupt amount value: {0}")]
    CorruptAmount(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS campaigns (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    chain_family         TEXT NOT NULL,
    chain_id             TEXT NOT NULL,
    token_address        TEXT,
    wallet_address       TEXT NOT NULL,
    batch_size           INTEGER NOT NULL,
    batch_delay_ms       INTEGER NOT NULL,
    status               TEXT NOT NULL,
    total_recipients     INTEGER NOT NULL DEFAULT 0,
    completed_recipients INTEGER NOT NULL DEFAULT 0,
    failed_recipients    INTEGER NOT NULL DEFAULT 0,
    fee_spent            TEXT NOT NULL DEFAULT '0',
    created_at           TIMESTAMP NOT NULL,
    updated_at           TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS recipients (
    id            TEXT PRIMARY KEY,
    campaign_id   TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    address       TEXT NOT NULL,
    amount        TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'PENDING',
    tx_ref        TEXT,
    batch_number  INTEGER NOT NULL,
    processing_at TIMESTAMP,
    updated_at    TIMESTAMP NOT NULL,
    UNIQUE (campaign_id, address)
);

CREATE INDEX IF NOT EXISTS idx_recipients_claim
    ON recipients (campaign_id, status, batch_number);

CREATE TABLE IF NOT EXISTS transactions (
    id              TEXT PRIMARY KEY,
    campaign_id     TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    tx_ref          TEXT NOT NULL UNIQUE,
    kind            TEXT NOT NULL,
    sender          TEXT NOT NULL,
    recipient_count INTEGER NOT NULL,
    total_amount    TEXT NOT NULL,
    fee_used        TEXT,
    status          TEXT NOT NULL DEFAULT 'PENDING',
    block_ref       TEXT,
    batch_number    INTEGER,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_campaign
    ON transactions (campaign_id, status);
"#;

/// Handle to the ledger store.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the store at the given SQLite URL.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs.
    ///
    /// Single connection: each SQLite `:memory:` connection is its own
    /// database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// The underlying pool, for multi-statement transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.init_schema().await.unwrap();
        store.init_schema().await.unwrap();
    }
}

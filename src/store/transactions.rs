//! Transaction records: one row per submitted on-chain operation.

use chrono::Utc;
use uuid::Uuid;

use crate::model::{TxKind, TxRecord, TxStatus};
use crate::store::{Store, StoreResult};

/// Parameters for recording a freshly-submitted operation.
#[derive(Debug, Clone)]
pub struct NewTxRecord {
    pub campaign_id: String,
    pub tx_ref: String,
    pub kind: TxKind,
    pub sender: String,
    pub recipient_count: i64,
    pub total_amount: String,
    pub batch_number: Option<i64>,
}

impl Store {
    /// Record a submitted operation as PENDING.
    ///
    /// Inserted immediately after submission so a crash before confirmation
    /// is still observable on restart. The unique `tx_ref` makes a
    /// duplicate insert a no-op rather than a second row.
    pub async fn record_submission(&self, new: NewTxRecord) -> StoreResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO transactions \
             (id, campaign_id, tx_ref, kind, sender, recipient_count, total_amount, \
              status, batch_number, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(tx_ref) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&new.campaign_id)
        .bind(&new.tx_ref)
        .bind(new.kind)
        .bind(&new.sender)
        .bind(new.recipient_count)
        .bind(&new.total_amount)
        .bind(TxStatus::Pending)
        .bind(new.batch_number)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Apply the confirmation waiter's terminal observation.
    ///
    /// Matches only rows still PENDING; a record is finalized at most once
    /// and never mutated afterward.
    pub async fn finalize_transaction(
        &self,
        tx_ref: &str,
        status: TxStatus,
        fee_used: Option<&str>,
        block_ref: Option<&str>,
    ) -> StoreResult<u64> {
        let finalized = sqlx::query(
            "UPDATE transactions SET status = ?, fee_used = ?, block_ref = ?, updated_at = ? \
             WHERE tx_ref = ? AND status = ?",
        )
        .bind(status)
        .bind(fee_used)
        .bind(block_ref)
        .bind(Utc::now())
        .bind(tx_ref)
        .bind(TxStatus::Pending)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(finalized)
    }

    /// Transfer references of this campaign's still-PENDING operations.
    ///
    /// Non-empty output blocks the administrative retry until the operator
    /// reconciles whether those transfers truly failed.
    pub async fn pending_tx_refs(&self, campaign_id: &str) -> StoreResult<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT tx_ref FROM transactions WHERE campaign_id = ? AND status = ? ORDER BY created_at",
        )
        .bind(campaign_id)
        .bind(TxStatus::Pending)
        .fetch_all(&self.pool)
        .await?)
    }

    /// All transaction records for a campaign, oldest first.
    pub async fn transactions_for_campaign(&self, campaign_id: &str) -> StoreResult<Vec<TxRecord>> {
        Ok(sqlx::query_as::<_, TxRecord>(
            "SELECT * FROM transactions WHERE campaign_id = ? ORDER BY created_at",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

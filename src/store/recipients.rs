//! Recipient rows: seeding, batch settlement, administrative retry.

use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::model::{Recipient, RecipientStatus};
use crate::store::{Store, StoreError, StoreResult};

/// Recipient counts grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub sent: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.sent + self.failed
    }
}

/// Recompute the campaign's aggregate counters from the recipients table.
///
/// Runs inside the caller's transaction so settlement and aggregates are
/// observed together. Counters are never incremented in place.
pub(crate) async fn recompute_aggregates(
    conn: &mut SqliteConnection,
    campaign_id: &str,
) -> StoreResult<()> {
    sqlx::query(
        "UPDATE campaigns SET \
           completed_recipients = \
             (SELECT COUNT(*) FROM recipients WHERE campaign_id = ?1 AND status = 'SENT'), \
           failed_recipients = \
             (SELECT COUNT(*) FROM recipients WHERE campaign_id = ?1 AND status = 'FAILED'), \
           updated_at = ?2 \
         WHERE id = ?1",
    )
    .bind(campaign_id)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

impl Store {
    /// Seed a campaign's recipient list, assigning batch numbers in
    /// insertion order in groups of `batch_size`.
    ///
    /// Entries are `(address, amount)` pairs; amounts must be positive
    /// base-unit decimal strings. Duplicate addresses within a campaign
    /// violate the unique constraint and fail the whole insert.
    pub async fn insert_recipients(
        &self,
        campaign_id: &str,
        entries: &[(String, String)],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let batch_size: Option<i64> =
            sqlx::query_scalar("SELECT batch_size FROM campaigns WHERE id = ?")
                .bind(campaign_id)
                .fetch_optional(&mut *tx)
                .await?;
        let batch_size =
            batch_size.ok_or_else(|| StoreError::NotFound(format!("campaign {campaign_id}")))?;
        if batch_size <= 0 {
            return Err(StoreError::CorruptAmount(format!(
                "batch_size {batch_size}"
            )));
        }

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recipients WHERE campaign_id = ?")
                .bind(campaign_id)
                .fetch_one(&mut *tx)
                .await?;

        let now = Utc::now();
        for (i, (address, amount)) in entries.iter().enumerate() {
            match amount.parse::<u128>() {
                Ok(v) if v > 0 => {}
                _ => return Err(StoreError::CorruptAmount(amount.clone())),
            }
            let batch_number = (existing + i as i64) / batch_size;
            sqlx::query(
                "INSERT INTO recipients \
                 (id, campaign_id, address, amount, status, batch_number, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(campaign_id)
            .bind(address)
            .bind(amount)
            .bind(RecipientStatus::Pending)
            .bind(batch_number)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE campaigns SET \
               total_recipients = (SELECT COUNT(*) FROM recipients WHERE campaign_id = ?1), \
               updated_at = ?2 \
             WHERE id = ?1",
        )
        .bind(campaign_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Recipient counts grouped by status.
    pub async fn recipient_counts(&self, campaign_id: &str) -> StoreResult<StatusCounts> {
        let rows: Vec<(RecipientStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM recipients WHERE campaign_id = ? GROUP BY status",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status {
                RecipientStatus::Pending => counts.pending = count,
                RecipientStatus::Processing => counts.processing = count,
                RecipientStatus::Sent => counts.sent = count,
                RecipientStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    /// Settle every PROCESSING recipient of a batch to SENT or FAILED and
    /// recompute the campaign aggregates, all in one transaction.
    ///
    /// Only rows still PROCESSING are matched, so a concurrent
    /// administrative action cannot be clobbered. Returns the number of
    /// rows settled; zero is an expected race outcome, not an error.
    pub async fn settle_batch(
        &self,
        campaign_id: &str,
        batch_number: i64,
        outcome: RecipientStatus,
        tx_ref: Option<&str>,
    ) -> StoreResult<u64> {
        debug_assert!(matches!(
            outcome,
            RecipientStatus::Sent | RecipientStatus::Failed
        ));

        let mut tx = self.pool.begin().await?;
        let settled = sqlx::query(
            "UPDATE recipients SET status = ?, tx_ref = ?, processing_at = NULL, updated_at = ? \
             WHERE campaign_id = ? AND batch_number = ? AND status = ?",
        )
        .bind(outcome)
        .bind(tx_ref)
        .bind(Utc::now())
        .bind(campaign_id)
        .bind(batch_number)
        .bind(RecipientStatus::Processing)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        recompute_aggregates(&mut tx, campaign_id).await?;
        tx.commit().await?;
        Ok(settled)
    }

    /// Return one claimed batch to PENDING, untouched.
    ///
    /// Used when a run stops before anything for the batch reached the
    /// chain, so a later resume picks the batch up immediately instead of
    /// waiting out the staleness window.
    pub async fn requeue_batch(&self, campaign_id: &str, batch_number: i64) -> StoreResult<u64> {
        let requeued = sqlx::query(
            "UPDATE recipients SET status = ?, processing_at = NULL, updated_at = ? \
             WHERE campaign_id = ? AND batch_number = ? AND status = ?",
        )
        .bind(RecipientStatus::Pending)
        .bind(Utc::now())
        .bind(campaign_id)
        .bind(batch_number)
        .bind(RecipientStatus::Processing)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(requeued)
    }

    /// Administrative retry: reset every FAILED recipient to PENDING.
    ///
    /// Returns the number of recipients reset. Batch numbers are preserved,
    /// so the resume path reprocesses exactly these rows in their original
    /// order.
    pub async fn reset_failed_recipients(&self, campaign_id: &str) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let reset = sqlx::query(
            "UPDATE recipients SET status = ?, tx_ref = NULL, updated_at = ? \
             WHERE campaign_id = ? AND status = ?",
        )
        .bind(RecipientStatus::Pending)
        .bind(Utc::now())
        .bind(campaign_id)
        .bind(RecipientStatus::Failed)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        recompute_aggregates(&mut tx, campaign_id).await?;
        tx.commit().await?;
        Ok(reset)
    }

    /// Sum of amounts not yet settled as SENT, base-unit decimal string.
    ///
    /// Used to size the allowance a token campaign needs before its first
    /// batch.
    pub async fn unsettled_amount_sum(&self, campaign_id: &str) -> StoreResult<String> {
        let amounts: Vec<String> = sqlx::query_scalar(
            "SELECT amount FROM recipients WHERE campaign_id = ? AND status IN (?, ?)",
        )
        .bind(campaign_id)
        .bind(RecipientStatus::Pending)
        .bind(RecipientStatus::Processing)
        .fetch_all(&self.pool)
        .await?;

        let mut total: u128 = 0;
        for amount in amounts {
            let value: u128 = amount
                .parse()
                .map_err(|_| StoreError::CorruptAmount(amount.clone()))?;
            total = total.saturating_add(value);
        }
        Ok(total.to_string())
    }

    /// All recipients of one batch, in insertion order.
    pub async fn recipients_in_batch(
        &self,
        campaign_id: &str,
        batch_number: i64,
    ) -> StoreResult<Vec<Recipient>> {
        Ok(sqlx::query_as::<_, Recipient>(
            "SELECT * FROM recipients WHERE campaign_id = ? AND batch_number = ? ORDER BY rowid",
        )
        .bind(campaign_id)
        .bind(batch_number)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChainFamily;
    use crate::store::NewCampaign;

    async fn seeded(n: usize, batch_size: i64) -> (Store, String) {
        let store = Store::in_memory().await.unwrap();
        let campaign = store
            .create_campaign(NewCampaign {
                name: "t".into(),
                chain_family: ChainFamily::Evm,
                chain_id: "1".into(),
                token_address: None,
                wallet_address: "0x0".into(),
                batch_size,
                batch_delay_ms: 0,
            })
            .await
            .unwrap();
        let entries: Vec<(String, String)> = (0..n)
            .map(|i| (format!("0x{i:040x}"), "1000".to_string()))
            .collect();
        store.insert_recipients(&campaign.id, &entries).await.unwrap();
        (store, campaign.id)
    }

    #[tokio::test]
    async fn test_batch_numbers_assigned_in_insertion_order() {
        let (store, id) = seeded(250, 100).await;

        let campaign = store.get_campaign(&id).await.unwrap();
        assert_eq!(campaign.total_recipients, 250);
        assert_eq!(campaign.total_batches(), 3);

        assert_eq!(store.recipients_in_batch(&id, 0).await.unwrap().len(), 100);
        assert_eq!(store.recipients_in_batch(&id, 1).await.unwrap().len(), 100);
        assert_eq!(store.recipients_in_batch(&id, 2).await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_settle_only_touches_processing_rows() {
        let (store, id) = seeded(10, 10).await;

        // Nothing is PROCESSING yet, so settling is a no-op.
        let settled = store
            .settle_batch(&id, 0, RecipientStatus::Sent, Some("0xabc"))
            .await
            .unwrap();
        assert_eq!(settled, 0);

        let counts = store.recipient_counts(&id).await.unwrap();
        assert_eq!(counts.pending, 10);
        assert_eq!(counts.sent, 0);
    }

    #[tokio::test]
    async fn test_reset_failed_preserves_batch_numbers() {
        let (store, id) = seeded(10, 5).await;

        sqlx::query("UPDATE recipients SET status = 'FAILED' WHERE campaign_id = ? AND batch_number = 1")
            .bind(&id)
            .execute(store.pool())
            .await
            .unwrap();

        let reset = store.reset_failed_recipients(&id).await.unwrap();
        assert_eq!(reset, 5);

        let batch = store.recipients_in_batch(&id, 1).await.unwrap();
        assert!(batch
            .iter()
            .all(|r| r.status == RecipientStatus::Pending && r.tx_ref.is_none()));
    }

    #[tokio::test]
    async fn test_aggregates_recomputed_from_rows() {
        let (store, id) = seeded(20, 10).await;

        sqlx::query("UPDATE recipients SET status = 'SENT' WHERE campaign_id = ? AND batch_number = 0")
            .bind(&id)
            .execute(store.pool())
            .await
            .unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        recompute_aggregates(&mut conn, &id).await.unwrap();
        // The in-memory pool holds a single connection; release it before
        // the next query needs one.
        drop(conn);

        let campaign = store.get_campaign(&id).await.unwrap();
        assert_eq!(campaign.completed_recipients, 10);
        assert_eq!(campaign.failed_recipients, 0);
        assert!(campaign.completed_recipients + campaign.failed_recipients <= campaign.total_recipients);
    }
}

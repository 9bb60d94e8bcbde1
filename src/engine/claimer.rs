//! Batch claimer: atomic PENDING → PROCESSING assignment.
//!
//! The claim is one database transaction: requeue stale PROCESSING rows,
//! find the smallest batch with PENDING work, flip that batch to
//! PROCESSING. Two loops racing for one campaign can never both claim a
//! recipient, and a crash between claim and submission self-heals through
//! the staleness requeue on the next claim.

use std::time::Duration;

use chrono::Utc;

use crate::model::{Recipient, RecipientStatus};
use crate::store::{Store, StoreResult};

/// One claimed batch, exclusively assigned to the calling run.
#[derive(Debug)]
pub struct ClaimedBatch {
    pub batch_number: i64,
    pub recipients: Vec<Recipient>,
}

/// Claim the next batch of pending recipients for a campaign.
///
/// Returns `None` when no PENDING recipients remain; an empty campaign
/// yields `None` immediately and the loop treats that as COMPLETED.
pub async fn claim_next_batch(
    store: &Store,
    campaign_id: &str,
    stale_after: Duration,
) -> StoreResult<Option<ClaimedBatch>> {
    let mut tx = store.pool().begin().await?;

    // (a) Requeue recipients stuck in PROCESSING past the staleness window.
    let stale_cutoff = Utc::now()
        - chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::zero());
    let requeued = sqlx::query(
        "UPDATE recipients SET status = ?, processing_at = NULL, updated_at = ? \
         WHERE campaign_id = ? AND status = ? AND processing_at < ?",
    )
    .bind(RecipientStatus::Pending)
    .bind(Utc::now())
    .bind(campaign_id)
    .bind(RecipientStatus::Processing)
    .bind(stale_cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if requeued > 0 {
        tracing::warn!(
            campaign_id = %campaign_id,
            requeued = requeued,
            "Requeued stale PROCESSING recipients to PENDING"
        );
    }

    // (b) Smallest batch that still has PENDING recipients.
    let batch_number: Option<i64> = sqlx::query_scalar(
        "SELECT MIN(batch_number) FROM recipients WHERE campaign_id = ? AND status = ?",
    )
    .bind(campaign_id)
    .bind(RecipientStatus::Pending)
    .fetch_one(&mut *tx)
    .await?;
    let Some(batch_number) = batch_number else {
        tx.commit().await?;
        return Ok(None);
    };

    // (c) Flip that batch's PENDING rows to PROCESSING. The claim timestamp
    // doubles as the claim marker: only rows stamped by this claim are
    // returned, so racing claims stay disjoint.
    let claimed_at = Utc::now();
    sqlx::query(
        "UPDATE recipients SET status = ?, processing_at = ?, updated_at = ? \
         WHERE campaign_id = ? AND batch_number = ? AND status = ?",
    )
    .bind(RecipientStatus::Processing)
    .bind(claimed_at)
    .bind(claimed_at)
    .bind(campaign_id)
    .bind(batch_number)
    .bind(RecipientStatus::Pending)
    .execute(&mut *tx)
    .await?;

    let recipients = sqlx::query_as::<_, Recipient>(
        "SELECT * FROM recipients \
         WHERE campaign_id = ? AND batch_number = ? AND status = ? AND processing_at = ? \
         ORDER BY rowid",
    )
    .bind(campaign_id)
    .bind(batch_number)
    .bind(RecipientStatus::Processing)
    .bind(claimed_at)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(ClaimedBatch {
        batch_number,
        recipients,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChainFamily;
    use crate::store::NewCampaign;
    use std::collections::HashSet;

    const STALE: Duration = Duration::from_secs(600);

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
            .map(|i| (format!("0x{i:040x}"), "1".to_string()))
            .collect();
        store.insert_recipients(&campaign.id, &entries).await.unwrap();
        (store, campaign.id)
    }

    #[tokio::test]
    async fn test_claims_smallest_batch_first() {
        let (store, id) = seeded(25, 10).await;

        let first = claim_next_batch(&store, &id, STALE).await.unwrap().unwrap();
        assert_eq!(first.batch_number, 0);
        assert_eq!(first.recipients.len(), 10);
        assert!(first
            .recipients
            .iter()
            .all(|r| r.status == RecipientStatus::Processing));
    }

    #[tokio::test]
    async fn test_sequential_claims_are_disjoint() {
        let (store, id) = seeded(25, 10).await;

        let mut seen = HashSet::new();
        let mut batches = Vec::new();
        while let Some(batch) = claim_next_batch(&store, &id, STALE).await.unwrap() {
            batches.push(batch.batch_number);
            for recipient in &batch.recipients {
                assert!(seen.insert(recipient.id.clone()), "recipient claimed twice");
            }
        }
        assert_eq!(batches, vec![0, 1, 2]);
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_empty_campaign_yields_no_work() {
        let (store, id) = seeded(0, 10).await;
        assert!(claim_next_batch(&store, &id, STALE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_processing_is_reclaimed() {
        let (store, id) = seeded(5, 5).await;

        let first = claim_next_batch(&store, &id, STALE).await.unwrap().unwrap();
        assert_eq!(first.recipients.len(), 5);

        // Crash before settlement: nothing settles, the rows stay
        // PROCESSING. With a zero staleness window the next claim requeues
        // and re-claims them.
        let second = claim_next_batch(&store, &id, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.batch_number, 0);
        assert_eq!(second.recipients.len(), 5);

        // Within the staleness window they stay locked.
        let third = claim_next_batch(&store, &id, STALE).await.unwrap();
        assert!(third.is_none());
    }

    #[tokio::test]
    async fn test_settled_batches_are_skipped() {
        let (store, id) = seeded(20, 10).await;

        let first = claim_next_batch(&store, &id, STALE).await.unwrap().unwrap();
        store
            .settle_batch(&id, first.batch_number, RecipientStatus::Sent, Some("0x1"))
            .await
            .unwrap();

        let second = claim_next_batch(&store, &id, STALE).await.unwrap().unwrap();
        assert_eq!(second.batch_number, 1);
    }
}

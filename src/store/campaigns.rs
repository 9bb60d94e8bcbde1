//! Campaign rows: creation, lifecycle transitions, aggregates, fees.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::model::{Campaign, CampaignStatus, ChainFamily};
use crate::store::{Store, StoreError, StoreResult};

/// Parameters for creating a campaign.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub chain_family: ChainFamily,
    pub chain_id: String,
    /// None means the chain's native token.
    pub token_address: Option<String>,
    pub wallet_address: String,
    pub batch_size: i64,
    pub batch_delay_ms: i64,
}

impl Store {
    /// Insert a new campaign in READY status (funding and contract
    /// deployment happen outside this engine).
    pub async fn create_campaign(&self, new: NewCampaign) -> StoreResult<Campaign> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO campaigns \
             (id, name, chain_family, chain_id, token_address, wallet_address, \
              batch_size, batch_delay_ms, status, fee_spent, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, '0', ?, ?)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(new.chain_family)
        .bind(&new.chain_id)
        .bind(&new.token_address)
        .bind(&new.wallet_address)
        .bind(new.batch_size)
        .bind(new.batch_delay_ms)
        .bind(CampaignStatus::Ready)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_campaign(&id).await
    }

    /// Fetch a campaign by id.
    pub async fn get_campaign(&self, id: &str) -> StoreResult<Campaign> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("campaign {id}")))
    }

    /// List all campaigns, newest first.
    pub async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        Ok(
            sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Transition a campaign's status, enforcing the lifecycle state machine
    /// inside one transaction.
    pub async fn set_campaign_status(&self, id: &str, next: CampaignStatus) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<CampaignStatus> =
            sqlx::query_scalar("SELECT status FROM campaigns WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| StoreError::NotFound(format!("campaign {id}")))?;

        if !current.can_transition(next) {
            return Err(StoreError::StatusPrecondition {
                id: id.to_string(),
                actual: current,
                expected: "a state that permits this transition",
            });
        }

        sqlx::query("UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(next)
            .bind(Utc::now())
            .bind(id)
            .bind(current)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Atomically move a READY or PAUSED campaign into SENDING.
    ///
    /// The conditional predicate is the cross-process guard: two runs racing
    /// for the same campaign see exactly one row updated between them. A
    /// campaign left SENDING with `updated_at` older than `stale_after` was
    /// abandoned by a dead process and is taken over; a live run refreshes
    /// `updated_at` on every settlement, so it is never stolen.
    pub async fn begin_run(&self, id: &str, stale_after: Duration) -> StoreResult<()> {
        let stale_cutoff = Utc::now()
            - chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::zero());
        let updated = sqlx::query(
            "UPDATE campaigns SET status = ?, updated_at = ? \
             WHERE id = ? AND (status IN (?, ?) OR (status = ? AND updated_at < ?))",
        )
        .bind(CampaignStatus::Sending)
        .bind(Utc::now())
        .bind(id)
        .bind(CampaignStatus::Ready)
        .bind(CampaignStatus::Paused)
        .bind(CampaignStatus::Sending)
        .bind(stale_cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let campaign = self.get_campaign(id).await?;
            return Err(StoreError::StatusPrecondition {
                id: id.to_string(),
                actual: campaign.status,
                expected: "READY, PAUSED, or SENDING abandoned past the staleness window",
            });
        }
        Ok(())
    }

    /// Add a settled batch's fee to the campaign's cumulative usage.
    pub async fn add_fee(&self, id: &str, fee: &str) -> StoreResult<()> {
        let fee: u128 = fee
            .parse()
            .map_err(|_| StoreError::CorruptAmount(fee.to_string()))?;

        let mut tx = self.pool.begin().await?;
        let current: Option<String> =
            sqlx::query_scalar("SELECT fee_spent FROM campaigns WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| StoreError::NotFound(format!("campaign {id}")))?;
        let current: u128 = current
            .parse()
            .map_err(|_| StoreError::CorruptAmount(current))?;

        sqlx::query("UPDATE campaigns SET fee_spent = ?, updated_at = ? WHERE id = ?")
            .bind(current.saturating_add(fee).to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

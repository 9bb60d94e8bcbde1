//! The per-campaign execution loop and administrative operations.
//!
//! `Engine` owns the store, the registered chain adapters, and the
//! control/progress surfaces. `run` drives one campaign at a time per
//! process: claim a batch, submit it, wait for confirmation, settle, and
//! repeat until no PENDING work remains. Every checkpoint re-reads
//! durable state, so a run killed at any point resumes cleanly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainAdapter, TokenId, TransferItem};
use crate::config::EngineConfig;
use crate::engine::allowance::{ensure_allowance, AllowanceOutcome};
use crate::engine::claimer::{claim_next_batch, ClaimedBatch};
use crate::engine::classifier::{classify, Disposition};
use crate::engine::control::ControlSurface;
use crate::engine::progress::{ProgressBus, ProgressSnapshot};
use crate::engine::waiter::{wait_for_transfer, PollPolicy, WaitOutcome};
use crate::engine::EngineError;
use crate::model::{Campaign, CampaignStatus, ChainFamily, RecipientStatus, TxKind, TxStatus};
use crate::observability::metrics;
use crate::store::{NewTxRecord, Store, StoreError};

/// Campaign execution engine.
///
/// Shared across tasks behind an `Arc`; all mutable campaign state lives
/// in the store, so the engine itself is immutable after construction.
pub struct Engine {
    store: Store,
    config: EngineConfig,
    control: Arc<ControlSurface>,
    progress: ProgressBus,
    adapters: HashMap<ChainFamily, Arc<dyn ChainAdapter>>,
}

impl Engine {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        let progress = ProgressBus::new(config.progress_capacity);
        Self {
            store,
            config,
            control: ControlSurface::new(),
            progress,
            adapters: HashMap::new(),
        }
    }

    /// Register the adapter serving one chain family, replacing any
    /// previous registration for that family.
    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.family(), adapter);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn control(&self) -> &Arc<ControlSurface> {
        &self.control
    }

    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    pub fn is_running(&self, campaign_id: &str) -> bool {
        self.control.is_running(campaign_id)
    }

    /// Execute a campaign until it completes, pauses, or fails.
    ///
    /// The run guard rejects a second in-process run, and the conditional
    /// READY/PAUSED → SENDING flip in the store rejects a second process.
    /// A campaign abandoned in SENDING by a crashed process is taken over
    /// once its last touch is older than the staleness window.
    /// Returns `Ok` for every orderly exit, including a pause; `Err` only
    /// for preconditions and infrastructure failures.
    pub async fn run(&self, campaign_id: &str) -> Result<(), EngineError> {
        let _guard = self
            .control
            .try_acquire(campaign_id)
            .ok_or_else(|| EngineError::AlreadyRunning(campaign_id.to_string()))?;

        let campaign = self.store.get_campaign(campaign_id).await?;
        let adapter = self
            .adapters
            .get(&campaign.chain_family)
            .ok_or(EngineError::NoAdapter(campaign.chain_family))?
            .clone();

        let stale_after = Duration::from_secs(self.config.stale_after_secs);
        self.store.begin_run(campaign_id, stale_after).await.map_err(|e| match e {
            StoreError::StatusPrecondition { id, actual, .. } => {
                EngineError::InvalidStatus { op: "run", id, actual }
            }
            other => EngineError::Store(other),
        })?;

        info!(
            campaign_id = %campaign_id,
            family = %campaign.chain_family,
            batch_size = campaign.batch_size,
            "Starting campaign run"
        );
        metrics::campaign_started();
        let result = self.run_loop(&campaign, adapter.as_ref()).await;
        metrics::campaign_stopped();

        if let Err(e) = &result {
            error!(campaign_id = %campaign_id, error = %e, "Campaign run aborted");
            // Leave an operator-visible terminal status rather than a
            // campaign stuck in SENDING.
            if let Err(e) = self
                .store
                .set_campaign_status(campaign_id, CampaignStatus::Failed)
                .await
            {
                warn!(campaign_id = %campaign_id, error = %e, "Could not mark campaign FAILED");
            }
        }
        result
    }

    async fn run_loop(
        &self,
        campaign: &Campaign,
        adapter: &dyn ChainAdapter,
    ) -> Result<(), EngineError> {
        let campaign_id = campaign.id.as_str();
        let policy = PollPolicy::for_family(campaign.chain_family, &self.config);
        let token = TokenId::from_optional(campaign.token_address.as_deref());
        let stale_after = Duration::from_secs(self.config.stale_after_secs);
        let batch_delay = Duration::from_millis(campaign.batch_delay_ms.max(0) as u64);
        let mut allowance_checked = false;

        loop {
            // Control checkpoint. A batch in flight is never interrupted;
            // pause and cancel take effect here, before the next claim.
            if self.control.cancel_requested(campaign_id)
                || self.control.pause_requested(campaign_id)
            {
                let cancelled = self.control.cancel_requested(campaign_id);
                self.store
                    .set_campaign_status(campaign_id, CampaignStatus::Paused)
                    .await?;
                self.control.clear(campaign_id);
                info!(
                    campaign_id = %campaign_id,
                    cancelled = cancelled,
                    "Run stopped at control checkpoint; campaign PAUSED"
                );
                return Ok(());
            }

            // Allowance stands before the first batch, so a rejected or
            // unconfirmable approval pauses the run without claiming work.
            if !allowance_checked && campaign.is_token_campaign() {
                if !self
                    .prepare_allowance(campaign, adapter, &token, &policy)
                    .await?
                {
                    return Ok(());
                }
                allowance_checked = true;
            }

            let Some(batch) = claim_next_batch(&self.store, campaign_id, stale_after).await? else {
                return self.finish_run(campaign_id).await;
            };

            if batch.recipients.is_empty() {
                // Another actor settled the batch between the claim's two
                // statements. Nothing was assigned to us; just look again.
                warn!(
                    campaign_id = %campaign_id,
                    batch = batch.batch_number,
                    "Claimed batch held no recipients"
                );
                continue;
            }

            match self
                .process_batch(campaign, adapter, &token, &batch, &policy)
                .await
            {
                Ok(()) => {}
                Err(EngineError::Chain(chain_error)) => {
                    let (disposition, category) = classify(&chain_error);
                    match disposition {
                        Disposition::Stop => {
                            error!(
                                campaign_id = %campaign_id,
                                batch = batch.batch_number,
                                category = category,
                                error = %chain_error,
                                "Fatal chain condition; pausing campaign"
                            );
                            // Nothing reached the chain for this batch, so
                            // hand it back untouched for the next resume.
                            self.store
                                .requeue_batch(campaign_id, batch.batch_number)
                                .await?;
                            self.store
                                .set_campaign_status(campaign_id, CampaignStatus::Paused)
                                .await?;
                            return Ok(());
                        }
                        Disposition::Continue => {
                            warn!(
                                campaign_id = %campaign_id,
                                batch = batch.batch_number,
                                category = category,
                                error = %chain_error,
                                "Batch failed; marking recipients FAILED and continuing"
                            );
                            let settled = self
                                .store
                                .settle_batch(
                                    campaign_id,
                                    batch.batch_number,
                                    RecipientStatus::Failed,
                                    None,
                                )
                                .await?;
                            metrics::record_batch_settled(
                                &campaign.chain_family.to_string(),
                                "failed",
                                settled,
                            );
                            self.publish_progress(campaign_id, batch.batch_number)
                                .await?;
                        }
                    }
                }
                Err(other) => return Err(other),
            }

            if !batch_delay.is_zero() {
                sleep(batch_delay).await;
            }
        }
    }

    /// No claimable work remains. COMPLETED only when nothing is PENDING
    /// or PROCESSING; otherwise another actor still holds recipients and
    /// this run simply steps aside.
    async fn finish_run(&self, campaign_id: &str) -> Result<(), EngineError> {
        let counts = self.store.recipient_counts(campaign_id).await?;
        if counts.pending == 0 && counts.processing == 0 {
            self.store
                .set_campaign_status(campaign_id, CampaignStatus::Completed)
                .await?;
            info!(
                campaign_id = %campaign_id,
                sent = counts.sent,
                failed = counts.failed,
                "Campaign completed"
            );
        } else {
            info!(
                campaign_id = %campaign_id,
                processing = counts.processing,
                "No claimable batch; recipients held elsewhere, leaving run"
            );
        }

        let refreshed = self.store.get_campaign(campaign_id).await?;
        self.progress.publish(ProgressSnapshot::from_campaign(
            &refreshed,
            refreshed.total_batches(),
        ));
        Ok(())
    }

    /// Ensure a standing token allowance before the first batch. A failed
    /// or unconfirmable approval pauses the campaign without touching any
    /// recipient; the `false` return tells the loop to exit orderly.
    async fn prepare_allowance(
        &self,
        campaign: &Campaign,
        adapter: &dyn ChainAdapter,
        token: &TokenId,
        policy: &PollPolicy,
    ) -> Result<bool, EngineError> {
        let campaign_id = campaign.id.as_str();
        let required = self.store.unsettled_amount_sum(campaign_id).await?;

        match ensure_allowance(adapter, token, &required, policy).await {
            Ok(AllowanceOutcome::Sufficient) => {
                debug!(campaign_id = %campaign_id, required = %required, "Allowance sufficient");
                Ok(true)
            }
            Ok(AllowanceOutcome::Approved {
                tx_ref,
                fee_used,
                block_ref,
            }) => {
                self.store
                    .record_submission(NewTxRecord {
                        campaign_id: campaign_id.to_string(),
                        tx_ref: tx_ref.clone(),
                        kind: TxKind::Approval,
                        sender: campaign.wallet_address.clone(),
                        recipient_count: 0,
                        total_amount: required.clone(),
                        batch_number: None,
                    })
                    .await?;
                self.store
                    .finalize_transaction(
                        &tx_ref,
                        TxStatus::Confirmed,
                        Some(&fee_used),
                        block_ref.as_deref(),
                    )
                    .await?;
                self.store.add_fee(campaign_id, &fee_used).await?;
                info!(
                    campaign_id = %campaign_id,
                    tx_ref = %tx_ref,
                    required = %required,
                    fee_used = %fee_used,
                    "Allowance approved"
                );
                Ok(true)
            }
            Err(EngineError::Chain(e)) => {
                error!(
                    campaign_id = %campaign_id,
                    error = %e,
                    "Could not establish allowance; pausing campaign"
                );
                self.store
                    .set_campaign_status(campaign_id, CampaignStatus::Paused)
                    .await?;
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    /// Submit one claimed batch and settle its recipients from the
    /// confirmation outcome.
    async fn process_batch(
        &self,
        campaign: &Campaign,
        adapter: &dyn ChainAdapter,
        token: &TokenId,
        batch: &ClaimedBatch,
        policy: &PollPolicy,
    ) -> Result<(), EngineError> {
        let campaign_id = campaign.id.as_str();
        let family = campaign.chain_family.to_string();
        let items: Vec<TransferItem> = batch
            .recipients
            .iter()
            .map(|r| TransferItem {
                address: r.address.clone(),
                amount: r.amount.clone(),
            })
            .collect();

        info!(
            campaign_id = %campaign_id,
            batch = batch.batch_number,
            recipients = items.len(),
            "Submitting batch transfer"
        );
        let tx_ref = adapter.submit_batch_transfer(&items, token).await?;

        // Recorded before waiting: a crash mid-confirmation leaves a
        // PENDING row that blocks retries until reconciled.
        self.store
            .record_submission(NewTxRecord {
                campaign_id: campaign_id.to_string(),
                tx_ref: tx_ref.clone(),
                kind: TxKind::BatchTransfer,
                sender: campaign.wallet_address.clone(),
                recipient_count: items.len() as i64,
                total_amount: sum_amounts(&items),
                batch_number: Some(batch.batch_number),
            })
            .await?;
        metrics::record_batch_submitted(&family);

        let started = Instant::now();
        match wait_for_transfer(adapter, &tx_ref, policy).await {
            WaitOutcome::Confirmed { fee_used, block_ref } => {
                self.store
                    .finalize_transaction(
                        &tx_ref,
                        TxStatus::Confirmed,
                        Some(&fee_used),
                        block_ref.as_deref(),
                    )
                    .await?;
                let settled = self
                    .store
                    .settle_batch(
                        campaign_id,
                        batch.batch_number,
                        RecipientStatus::Sent,
                        Some(&tx_ref),
                    )
                    .await?;
                self.store.add_fee(campaign_id, &fee_used).await?;
                metrics::record_batch_settled(&family, "sent", settled);
                metrics::record_confirmation_latency(&family, started.elapsed().as_secs_f64());
                info!(
                    campaign_id = %campaign_id,
                    batch = batch.batch_number,
                    tx_ref = %tx_ref,
                    recipients = settled,
                    fee_used = %fee_used,
                    "Batch confirmed"
                );
            }
            WaitOutcome::Failed(reason) => {
                self.store
                    .finalize_transaction(&tx_ref, TxStatus::Failed, None, None)
                    .await?;
                let settled = self
                    .store
                    .settle_batch(
                        campaign_id,
                        batch.batch_number,
                        RecipientStatus::Failed,
                        Some(&tx_ref),
                    )
                    .await?;
                metrics::record_batch_settled(&family, "failed", settled);
                warn!(
                    campaign_id = %campaign_id,
                    batch = batch.batch_number,
                    tx_ref = %tx_ref,
                    reason = %reason,
                    "Batch transfer failed on-ledger"
                );
            }
            WaitOutcome::TimedOut => {
                // Transaction record stays PENDING: the transfer may still
                // land, so the reference must be reconciled before any
                // retry of these recipients.
                let settled = self
                    .store
                    .settle_batch(
                        campaign_id,
                        batch.batch_number,
                        RecipientStatus::Failed,
                        Some(&tx_ref),
                    )
                    .await?;
                metrics::record_batch_settled(&family, "timed-out", settled);
                warn!(
                    campaign_id = %campaign_id,
                    batch = batch.batch_number,
                    tx_ref = %tx_ref,
                    "Confirmation ceiling reached; transfer may still land"
                );
            }
        }

        self.publish_progress(campaign_id, batch.batch_number).await
    }

    async fn publish_progress(
        &self,
        campaign_id: &str,
        current_batch: i64,
    ) -> Result<(), EngineError> {
        let campaign = self.store.get_campaign(campaign_id).await?;
        self.progress
            .publish(ProgressSnapshot::from_campaign(&campaign, current_batch));
        Ok(())
    }

    /// Request a pause; honored at the running loop's next checkpoint.
    pub async fn pause(&self, campaign_id: &str) -> Result<(), EngineError> {
        if self.control.is_running(campaign_id) {
            self.control.request_pause(campaign_id);
            info!(campaign_id = %campaign_id, "Pause requested");
            return Ok(());
        }
        let campaign = self.store.get_campaign(campaign_id).await?;
        Err(EngineError::InvalidStatus {
            op: "pause",
            id: campaign_id.to_string(),
            actual: campaign.status,
        })
    }

    /// Request a cancel. Identical to pause at the checkpoint; the
    /// distinct flag exists so callers can tell the two intents apart.
    pub async fn cancel(&self, campaign_id: &str) -> Result<(), EngineError> {
        if self.control.is_running(campaign_id) {
            self.control.request_cancel(campaign_id);
            info!(campaign_id = %campaign_id, "Cancel requested");
            return Ok(());
        }
        let campaign = self.store.get_campaign(campaign_id).await?;
        Err(EngineError::InvalidStatus {
            op: "cancel",
            id: campaign_id.to_string(),
            actual: campaign.status,
        })
    }

    /// Resume a PAUSED campaign. With nothing left to send the campaign
    /// moves straight to COMPLETED without entering the loop.
    pub async fn resume(&self, campaign_id: &str) -> Result<(), EngineError> {
        let campaign = self.store.get_campaign(campaign_id).await?;
        if campaign.status != CampaignStatus::Paused {
            return Err(EngineError::InvalidStatus {
                op: "resume",
                id: campaign_id.to_string(),
                actual: campaign.status,
            });
        }

        let counts = self.store.recipient_counts(campaign_id).await?;
        if counts.pending == 0 && counts.processing == 0 {
            self.store
                .set_campaign_status(campaign_id, CampaignStatus::Completed)
                .await?;
            info!(campaign_id = %campaign_id, "Nothing left to send; campaign COMPLETED");
            return Ok(());
        }

        self.run(campaign_id).await
    }

    /// Reset every FAILED recipient to PENDING and park the campaign in
    /// PAUSED, ready for `resume`. Refused while any submitted transfer is
    /// still unreconciled, because one of those may yet pay the same
    /// recipients.
    pub async fn retry_failed(&self, campaign_id: &str) -> Result<u64, EngineError> {
        let campaign = self.store.get_campaign(campaign_id).await?;
        if !matches!(
            campaign.status,
            CampaignStatus::Paused | CampaignStatus::Completed | CampaignStatus::Failed
        ) {
            return Err(EngineError::InvalidStatus {
                op: "retry failed recipients",
                id: campaign_id.to_string(),
                actual: campaign.status,
            });
        }

        let pending = self.store.pending_tx_refs(campaign_id).await?;
        if !pending.is_empty() {
            error!(
                campaign_id = %campaign_id,
                pending = pending.len(),
                refs = ?pending,
                "Refusing retry: unreconciled transaction records"
            );
            return Err(EngineError::UnreconciledTransactions(
                campaign_id.to_string(),
            ));
        }

        let reset = self.store.reset_failed_recipients(campaign_id).await?;
        if campaign.status != CampaignStatus::Paused {
            self.store
                .set_campaign_status(campaign_id, CampaignStatus::Paused)
                .await?;
        }
        info!(campaign_id = %campaign_id, reset = reset, "Failed recipients requeued");
        Ok(reset)
    }
}

/// Sum base-unit amounts for the transaction record. Amounts were
/// validated at insert time; anything unparsable contributes zero here
/// and fails properly at the adapter.
fn sum_amounts(items: &[TransferItem]) -> String {
    items
        .iter()
        .filter_map(|i| i.amount.parse::<u128>().ok())
        .fold(0u128, u128::saturating_add)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_amounts() {
        let items = vec![
            TransferItem {
                address: "a".into(),
                amount: "100".into(),
            },
            TransferItem {
                address: "b".into(),
                amount: "250".into(),
            },
        ];
        assert_eq!(sum_amounts(&items), "350");
    }

    #[test]
    fn test_sum_amounts_skips_unparsable() {
        let items = vec![TransferItem {
            address: "a".into(),
            amount: "not-a-number".into(),
        }];
        assert_eq!(sum_amounts(&items), "0");
    }
}

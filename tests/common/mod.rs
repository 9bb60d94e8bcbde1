//! Shared utilities for engine integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use airdrop_engine::chain::{
    ChainAdapter, ChainError, ChainFamily, TokenId, TransferItem, TransferStatus,
};
use airdrop_engine::config::EngineConfig;
use airdrop_engine::store::{NewCampaign, Store};
use airdrop_engine::Engine;

type SubmitFn = dyn Fn(usize, &[TransferItem]) -> Result<String, ChainError> + Send + Sync;
type StatusFn = dyn Fn(&str) -> Result<TransferStatus, ChainError> + Send + Sync;

/// Programmable in-memory chain adapter.
///
/// Defaults to confirming everything instantly; individual behaviors are
/// replaced per test with closures. Submissions are recorded so tests can
/// assert exactly which recipients went on-chain, and how often.
pub struct MockAdapter {
    family: ChainFamily,
    submit_count: AtomicUsize,
    submissions: Mutex<Vec<Vec<TransferItem>>>,
    submit_fn: Box<SubmitFn>,
    status_fn: Box<StatusFn>,
    allowance_covered: bool,
}

#[allow(dead_code)]
impl MockAdapter {
    pub fn confirming(family: ChainFamily) -> Self {
        Self {
            family,
            submit_count: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            submit_fn: Box::new(|attempt, _| Ok(format!("tx-{attempt}"))),
            status_fn: Box::new(|_| {
                Ok(TransferStatus::Confirmed {
                    fee_used: "5000".to_string(),
                    block_ref: Some("1".to_string()),
                })
            }),
            allowance_covered: true,
        }
    }

    /// Replace the submit behavior. The closure sees the zero-based
    /// submission attempt index and the batch items.
    pub fn with_submit<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, &[TransferItem]) -> Result<String, ChainError> + Send + Sync + 'static,
    {
        self.submit_fn = Box::new(f);
        self
    }

    /// Replace the status-poll behavior.
    pub fn with_status<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<TransferStatus, ChainError> + Send + Sync + 'static,
    {
        self.status_fn = Box::new(f);
        self
    }

    pub fn without_allowance(mut self) -> Self {
        self.allowance_covered = false;
        self
    }

    pub fn submissions(&self) -> Vec<Vec<TransferItem>> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    /// Every address that reached the chain, across all submissions.
    pub fn submitted_addresses(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|i| i.address.clone())
            .collect()
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn submit_batch_transfer(
        &self,
        items: &[TransferItem],
        _token: &TokenId,
    ) -> Result<String, ChainError> {
        let attempt = self.submit_count.fetch_add(1, Ordering::SeqCst);
        let result = (self.submit_fn)(attempt, items);
        if result.is_ok() {
            self.submissions.lock().unwrap().push(items.to_vec());
        }
        result
    }

    async fn transfer_status(&self, tx_ref: &str) -> Result<TransferStatus, ChainError> {
        (self.status_fn)(tx_ref)
    }

    async fn check_allowance(&self, _token: &TokenId, _required: &str) -> Result<bool, ChainError> {
        Ok(self.allowance_covered)
    }

    async fn approve_allowance(&self, _token: &TokenId, _amount: &str) -> Result<String, ChainError> {
        Ok("approval-tx".to_string())
    }
}

/// Engine config with millisecond polling so tests settle fast.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_initial_ms: 1,
        poll_max_ms: 2,
        ..EngineConfig::default()
    }
}

pub fn engine_with(store: Store, config: EngineConfig, adapter: Arc<MockAdapter>) -> Arc<Engine> {
    Arc::new(Engine::new(store, config).with_adapter(adapter))
}

/// A READY Solana campaign with `recipients` sequentially-addressed
/// entries of 1000 lamports each, zero inter-batch delay.
#[allow(dead_code)]
pub async fn seeded_campaign(store: &Store, recipients: usize, batch_size: i64) -> String {
    let campaign = store
        .create_campaign(NewCampaign {
            name: "drop".to_string(),
            chain_family: ChainFamily::Solana,
            chain_id: "devnet".to_string(),
            token_address: None,
            wallet_address: "payer".to_string(),
            batch_size,
            batch_delay_ms: 0,
        })
        .await
        .unwrap();

    let entries: Vec<(String, String)> = (0..recipients)
        .map(|i| (format!("recipient-{i}"), "1000".to_string()))
        .collect();
    if !entries.is_empty() {
        store.insert_recipients(&campaign.id, &entries).await.unwrap();
    }
    campaign.id
}

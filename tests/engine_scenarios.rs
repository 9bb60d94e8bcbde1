//! End-to-end campaign execution scenarios against a mock chain adapter.

mod common;

use std::sync::{Arc, OnceLock};

use airdrop_engine::chain::{ChainError, ChainFamily, TransferStatus};
use airdrop_engine::engine::control::ControlSurface;
use airdrop_engine::engine::EngineError;
use airdrop_engine::model::{CampaignStatus, RecipientStatus, TxKind, TxStatus};
use airdrop_engine::store::{NewCampaign, Store};

use common::{engine_with, fast_config, seeded_campaign, MockAdapter};

#[tokio::test]
async fn test_campaign_runs_to_completion_in_batches() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 250, 100).await;
    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Solana));
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());

    engine.run(&id).await.unwrap();

    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.completed_recipients, 250);
    assert_eq!(campaign.failed_recipients, 0);

    // Three batches: 100, 100, 50, in order.
    let submissions = adapter.submissions();
    assert_eq!(submissions.len(), 3);
    assert_eq!(submissions[0].len(), 100);
    assert_eq!(submissions[1].len(), 100);
    assert_eq!(submissions[2].len(), 50);
    // Batches follow insertion order: the first holds recipients 0..99,
    // the last holds 200..249.
    assert!(submissions[0]
        .iter()
        .all(|i| i.address.strip_prefix("recipient-").unwrap().parse::<usize>().unwrap() < 100));
    assert!(submissions[2]
        .iter()
        .all(|i| i.address.strip_prefix("recipient-").unwrap().parse::<usize>().unwrap() >= 200));

    // One confirmed transaction record per batch, fees accumulated.
    let txs = store.transactions_for_campaign(&id).await.unwrap();
    assert_eq!(txs.len(), 3);
    assert!(txs.iter().all(|t| t.status == TxStatus::Confirmed));
    assert_eq!(campaign.fee_spent, "15000");
}

#[tokio::test]
async fn test_empty_campaign_completes_immediately() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 0, 100).await;
    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Solana));
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());

    engine.run(&id).await.unwrap();

    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(adapter.submission_count(), 0);
}

#[tokio::test]
async fn test_pause_honored_before_next_claim_and_resume_finishes() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 250, 100).await;
    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Solana));
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());

    // Pause flag raised before the run even starts: the first checkpoint
    // trips and nothing is claimed.
    engine.control().request_pause(&id);
    engine.run(&id).await.unwrap();

    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Paused);
    assert_eq!(adapter.submission_count(), 0);

    // Resume clears the flag and drains the campaign.
    engine.resume(&id).await.unwrap();
    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.completed_recipients, 250);
    assert_eq!(adapter.submission_count(), 3);
}

#[tokio::test]
async fn test_pause_during_batch_settles_it_and_skips_the_next() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 250, 100).await;

    // The pause lands while the second batch is confirming: that batch
    // still settles, the third is never claimed.
    let control: Arc<OnceLock<Arc<ControlSurface>>> = Arc::new(OnceLock::new());
    let slot = control.clone();
    let pause_id = id.clone();
    let adapter = Arc::new(
        MockAdapter::confirming(ChainFamily::Solana).with_status(move |tx_ref| {
            if tx_ref == "tx-1" {
                if let Some(surface) = slot.get() {
                    surface.request_pause(&pause_id);
                }
            }
            Ok(TransferStatus::Confirmed {
                fee_used: "5000".to_string(),
                block_ref: Some("1".to_string()),
            })
        }),
    );
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());
    let _ = control.set(engine.control().clone());

    engine.run(&id).await.unwrap();

    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Paused);
    assert_eq!(campaign.completed_recipients, 200);
    assert_eq!(adapter.submission_count(), 2);
    let counts = store.recipient_counts(&id).await.unwrap();
    assert_eq!(counts.pending, 50);
    assert_eq!(counts.processing, 0);

    engine.resume(&id).await.unwrap();
    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.completed_recipients, 250);
    assert_eq!(adapter.submission_count(), 3);
}

#[tokio::test]
async fn test_token_campaign_approves_allowance_and_records_its_fee() {
    let store = Store::in_memory().await.unwrap();
    let campaign = store
        .create_campaign(NewCampaign {
            name: "token-drop".to_string(),
            chain_family: ChainFamily::Solana,
            chain_id: "devnet".to_string(),
            token_address: Some("Mint11111111111111111111111111111111111111".to_string()),
            wallet_address: "payer".to_string(),
            batch_size: 100,
            batch_delay_ms: 0,
        })
        .await
        .unwrap();
    let entries: Vec<(String, String)> = (0..50)
        .map(|i| (format!("recipient-{i}"), "1000".to_string()))
        .collect();
    store.insert_recipients(&campaign.id, &entries).await.unwrap();

    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Solana).without_allowance());
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());

    engine.run(&campaign.id).await.unwrap();

    // One approval plus one batch transfer; both fees count toward the
    // campaign's spend.
    let refreshed = store.get_campaign(&campaign.id).await.unwrap();
    assert_eq!(refreshed.status, CampaignStatus::Completed);
    assert_eq!(refreshed.completed_recipients, 50);
    assert_eq!(refreshed.fee_spent, "10000");

    let txs = store.transactions_for_campaign(&campaign.id).await.unwrap();
    assert_eq!(txs.len(), 2);
    let approval = txs.iter().find(|t| t.kind == TxKind::Approval).unwrap();
    assert_eq!(approval.status, TxStatus::Confirmed);
    assert_eq!(approval.fee_used.as_deref(), Some("5000"));
    assert_eq!(approval.total_amount, "50000");
}

#[tokio::test]
async fn test_transient_failure_fails_batch_and_continues() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 250, 100).await;
    // Second submission hits a transport failure; the rest go through.
    let adapter = Arc::new(
        MockAdapter::confirming(ChainFamily::Solana).with_submit(|attempt, _| {
            if attempt == 1 {
                Err(ChainError::Network("connection reset by peer".into()))
            } else {
                Ok(format!("tx-{attempt}"))
            }
        }),
    );
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());

    engine.run(&id).await.unwrap();

    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.completed_recipients, 150);
    assert_eq!(campaign.failed_recipients, 100);

    // The failed batch produced no transaction record.
    let txs = store.transactions_for_campaign(&id).await.unwrap();
    assert_eq!(txs.len(), 2);
    assert!(txs.iter().all(|t| t.status == TxStatus::Confirmed));
}

#[tokio::test]
async fn test_on_ledger_failure_settles_batch_failed() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 50, 100).await;
    let adapter = Arc::new(
        MockAdapter::confirming(ChainFamily::Solana)
            .with_status(|_| Ok(TransferStatus::Failed("custom program error: 0x1".into()))),
    );
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());

    engine.run(&id).await.unwrap();

    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.completed_recipients, 0);
    assert_eq!(campaign.failed_recipients, 50);

    // The transaction record carries the terminal observation, and the
    // recipients keep the reference for audit.
    let txs = store.transactions_for_campaign(&id).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TxStatus::Failed);
    let batch = store.recipients_in_batch(&id, 0).await.unwrap();
    assert!(batch
        .iter()
        .all(|r| r.status == RecipientStatus::Failed && r.tx_ref.as_deref() == Some("tx-0")));
}

#[tokio::test]
async fn test_retry_failed_requeues_and_resume_sends() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 250, 100).await;
    let adapter = Arc::new(
        MockAdapter::confirming(ChainFamily::Solana).with_submit(|attempt, _| {
            if attempt == 1 {
                Err(ChainError::Network("temporarily unavailable".into()))
            } else {
                Ok(format!("tx-{attempt}"))
            }
        }),
    );
    let engine = engine_with(store.clone(), fast_config(), adapter.clone());

    engine.run(&id).await.unwrap();
    assert_eq!(
        store.get_campaign(&id).await.unwrap().failed_recipients,
        100
    );

    let reset = engine.retry_failed(&id).await.unwrap();
    assert_eq!(reset, 100);
    assert_eq!(
        store.get_campaign(&id).await.unwrap().status,
        CampaignStatus::Paused
    );

    engine.resume(&id).await.unwrap();
    let campaign = store.get_campaign(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.completed_recipients, 250);
    assert_eq!(campaign.failed_recipients, 0);
}

#[tokio::test]
async fn test_progress_snapshots_track_settlement() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 250, 100).await;
    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Solana));
    let engine = engine_with(store.clone(), fast_config(), adapter);

    let mut rx = engine.subscribe_progress();
    engine.run(&id).await.unwrap();

    let mut snapshots = Vec::new();
    while let Ok(s) = rx.try_recv() {
        snapshots.push(s);
    }
    assert!(!snapshots.is_empty());
    let last = snapshots.last().unwrap();
    assert_eq!(last.completed_recipients, 250);
    assert_eq!(last.total_batches, 3);
    // Completed counts never regress across the run.
    assert!(snapshots
        .windows(2)
        .all(|w| w[0].completed_recipients <= w[1].completed_recipients));
}

#[tokio::test]
async fn test_run_requires_ready_or_paused() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 10, 10).await;
    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Solana));
    let engine = engine_with(store.clone(), fast_config(), adapter);

    engine.run(&id).await.unwrap();
    // COMPLETED is not a runnable status; resume is the only way back in.
    let err = engine.run(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidStatus { .. }));
}

#[tokio::test]
async fn test_missing_adapter_is_rejected() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 10, 10).await;
    // Solana campaign, EVM-only engine.
    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Evm));
    let engine = engine_with(store.clone(), fast_config(), adapter);

    let err = engine.run(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::NoAdapter(ChainFamily::Solana)));
    // Status untouched: the precondition failed before begin_run.
    assert_eq!(
        store.get_campaign(&id).await.unwrap().status,
        CampaignStatus::Ready
    );
}

#[tokio::test]
async fn test_pause_of_idle_campaign_is_invalid() {
    let store = Store::in_memory().await.unwrap();
    let id = seeded_campaign(&store, 10, 10).await;
    let adapter = Arc::new(MockAdapter::confirming(ChainFamily::Solana));
    let engine = engine_with(store.clone(), fast_config(), adapter);

    let err = engine.pause(&id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStatus { op: "pause", .. }
    ));
}

//! Best-effort progress snapshots, one per batch settlement.
//!
//! Delivery is at-most-once: slow subscribers lose old snapshots rather
//! than slowing the loop, and the ledger store remains the source of truth.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::Campaign;

/// One progress observation, emitted after a batch settles.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub campaign_id: String,
    pub total_recipients: i64,
    pub completed_recipients: i64,
    pub failed_recipients: i64,
    pub current_batch: i64,
    pub total_batches: i64,
}

impl ProgressSnapshot {
    pub fn from_campaign(campaign: &Campaign, current_batch: i64) -> Self {
        Self {
            campaign_id: campaign.id.clone(),
            total_recipients: campaign.total_recipients,
            completed_recipients: campaign.completed_recipients,
            failed_recipients: campaign.failed_recipients,
            current_batch,
            total_batches: campaign.total_batches(),
        }
    }
}

/// Broadcast bus for progress snapshots.
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressSnapshot>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// Publish a snapshot; dropped when nobody is listening.
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        let _ = self.tx.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = ProgressBus::new(8);
        bus.publish(ProgressSnapshot {
            campaign_id: "c1".into(),
            total_recipients: 10,
            completed_recipients: 5,
            failed_recipients: 0,
            current_batch: 0,
            total_batches: 1,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_snapshot() {
        let bus = ProgressBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(ProgressSnapshot {
            campaign_id: "c1".into(),
            total_recipients: 10,
            completed_recipients: 10,
            failed_recipients: 0,
            current_batch: 1,
            total_batches: 1,
        });
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.completed_recipients, 10);
    }
}

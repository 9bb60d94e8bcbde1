//! Control surface: pause/cancel flags and the per-campaign run guard.
//!
//! Flags are process-local and consulted only at the loop's safe
//! checkpoints; the campaign status column in the ledger store remains the
//! source of truth. The run guard enforces at most one active run per
//! campaign within this process; the SENDING-status predicate in the store
//! enforces it across processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
struct ControlFlags {
    pause: AtomicBool,
    cancel: AtomicBool,
}

/// Keyed registry of control flags and active runs.
#[derive(Default)]
pub struct ControlSurface {
    flags: DashMap<String, Arc<ControlFlags>>,
    running: DashMap<String, ()>,
}

impl ControlSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn handle(&self, campaign_id: &str) -> Arc<ControlFlags> {
        self.flags
            .entry(campaign_id.to_string())
            .or_default()
            .clone()
    }

    /// Ask the campaign's loop to persist PAUSED and exit at the next
    /// checkpoint.
    pub fn request_pause(&self, campaign_id: &str) {
        self.handle(campaign_id).pause.store(true, Ordering::SeqCst);
    }

    /// Ask the campaign's loop to stop before claiming the next batch. The
    /// in-flight batch still runs to confirmation.
    pub fn request_cancel(&self, campaign_id: &str) {
        self.handle(campaign_id)
            .cancel
            .store(true, Ordering::SeqCst);
    }

    pub fn pause_requested(&self, campaign_id: &str) -> bool {
        self.handle(campaign_id).pause.load(Ordering::SeqCst)
    }

    pub fn cancel_requested(&self, campaign_id: &str) -> bool {
        self.handle(campaign_id).cancel.load(Ordering::SeqCst)
    }

    /// Reset flags after a run honors a request. A flag raised before a
    /// run starts stays raised, so the first checkpoint still trips.
    pub fn clear(&self, campaign_id: &str) {
        let flags = self.handle(campaign_id);
        flags.pause.store(false, Ordering::SeqCst);
        flags.cancel.store(false, Ordering::SeqCst);
    }

    /// Whether a run is active for this campaign in this process.
    pub fn is_running(&self, campaign_id: &str) -> bool {
        self.running.contains_key(campaign_id)
    }

    /// Acquire the exclusive run slot for a campaign. Returns `None` when a
    /// run is already active; the slot is released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>, campaign_id: &str) -> Option<RunGuard> {
        match self.running.entry(campaign_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(RunGuard {
                    campaign_id: campaign_id.to_string(),
                    surface: Arc::clone(self),
                })
            }
        }
    }
}

/// RAII handle for a campaign's exclusive run slot.
pub struct RunGuard {
    campaign_id: String,
    surface: Arc<ControlSurface>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.surface.running.remove(&self.campaign_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_guard_exclusivity() {
        let surface = ControlSurface::new();

        let guard = surface.try_acquire("c1").expect("first acquire");
        assert!(surface.is_running("c1"));
        assert!(surface.try_acquire("c1").is_none());

        // Different campaigns are independent.
        assert!(surface.try_acquire("c2").is_some());

        drop(guard);
        assert!(!surface.is_running("c1"));
        assert!(surface.try_acquire("c1").is_some());
    }

    #[test]
    fn test_flags_round_trip() {
        let surface = ControlSurface::new();

        assert!(!surface.pause_requested("c1"));
        surface.request_pause("c1");
        surface.request_cancel("c1");
        assert!(surface.pause_requested("c1"));
        assert!(surface.cancel_requested("c1"));

        surface.clear("c1");
        assert!(!surface.pause_requested("c1"));
        assert!(!surface.cancel_requested("c1"));
    }
}

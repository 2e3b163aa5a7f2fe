/// In-process ledger with synthetic receipts.
///
/// Keeps committed roots in memory so `confirm_exists` answers truthfully
/// for anything committed through the same instance. Failure injection
/// (`set_offline`, `fail_next`) and artificial latency make every
/// adapter-facing path of the service testable without a network.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChainAdapter, CommitRequest, Receipt};
use crate::crypto::hash::Hash256;
use crate::error::{AnchorError, Result};

pub const SIMULATED_NETWORK: &str = "simulated";

pub struct SimulatedAdapter {
    network: String,
    committed: Mutex<HashMap<Hash256, Receipt>>,
    offline: AtomicBool,
    fail_next: AtomicUsize,
    commit_calls: AtomicUsize,
    latency: Option<Duration>,
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new(SIMULATED_NETWORK)
    }
}

impl SimulatedAdapter {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.to_string(),
            committed: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            commit_calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Delay every commit by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While offline, every call fails with an adapter error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `count` commits.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of commit attempts seen, successful or not.
    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn committed_roots(&self) -> Vec<Hash256> {
        let mut roots: Vec<Hash256> = self.committed.lock().keys().copied().collect();
        roots.sort_unstable();
        roots
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AnchorError::Adapter(format!(
                "{} network unreachable",
                self.network
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainAdapter for SimulatedAdapter {
    fn network(&self) -> &str {
        &self.network
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn commit(&self, request: &CommitRequest) -> Result<Receipt> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.check_online()?;

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AnchorError::Adapter("simulated commit failure".into()));
        }

        let mut committed = self.committed.lock();
        // Re-committing a root returns the original receipt
        if let Some(existing) = committed.get(&request.merkle_root) {
            debug!(root = %request.merkle_root, "Root already committed");
            return Ok(existing.clone());
        }

        let receipt = Receipt {
            external_id: format!("sim-{}", Uuid::now_v7()),
            confirmed_at: Utc::now(),
            network: self.network.clone(),
            is_simulated: true,
        };
        committed.insert(request.merkle_root, receipt.clone());

        info!(
            network = %self.network,
            root = %request.merkle_root,
            day = request.day_timestamp,
            leaf_count = request.leaf_count,
            external_id = %receipt.external_id,
            "Simulated anchor committed"
        );

        Ok(receipt)
    }

    async fn confirm_exists(&self, root: &Hash256) -> Result<bool> {
        self.check_online()?;
        Ok(self.committed.lock().contains_key(root))
    }
}

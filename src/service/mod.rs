/// Consent anchoring service.
///
/// Coordinates the batch lifecycle:
/// 1. `record_consent` hashes an event and appends it to the day's
///    pending batch, first anchoring any batch left over from an earlier day
/// 2. `close_batch` builds the Merkle tree, commits the root through the
///    chain adapter, and moves the batch to the anchored list
/// 3. `verify` finds a leaf, regenerates its proof, and optionally asks the
///    adapter to confirm the root
///
/// ```text
/// OPEN ──close_batch──▶ CLOSING ──commit ok──▶ ANCHORED
///   ▲                      │
///   └──── commit failed ───┘   (all leaves kept for retry)
/// ```
///
/// Closes are serialized. While a commit is in flight, the batch sits in
/// the `closing` slot and new events start a fresh pending batch, so a
/// batch is never appended to while it is being anchored. A failed,
/// timed-out or cancelled commit puts the batch back as open.
pub mod report;
pub mod schedule;
pub mod verify;

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::anchor::{ChainAdapter, CommitRequest};
use crate::clock::{utc_midnight, Clock, SystemClock};
use crate::config::AnchorConfig;
use crate::crypto::hash::{self, Hash256, HashProvider};
use crate::error::{AnchorError, Result};
use crate::event::ConsentEvent;
use crate::merkle::tree::MerkleTree;
use crate::state::models::{
    storage_pointer, AnchoredBatch, BatchLeaf, BatchSummary, OpenBatches, PendingBatch,
    StoredAnchoredBatch,
};
use crate::state::BatchStore;

pub use report::{BatchInfo, CloseOutcome, RecordedConsent, Rollover, Stats};
pub use verify::{AnchoredProof, OnChainStatus, ProofBundle, VerifyOutcome, VerifyStatus};

/// Builder for wiring an [`AnchorService`] from its collaborators.
pub struct AnchorServiceBuilder {
    config: AnchorConfig,
    adapter: Arc<dyn ChainAdapter>,
    store: Arc<dyn BatchStore>,
    hasher: Option<Arc<dyn HashProvider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AnchorServiceBuilder {
    pub fn config(mut self, config: AnchorConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the hash provider derived from the config.
    pub fn hasher(mut self, hasher: Arc<dyn HashProvider>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Load persisted state and build the service.
    ///
    /// Fails if stored state cannot be read or does not rebuild to the
    /// stored roots. Starting empty over unreadable history would let the
    /// next save overwrite it.
    pub async fn open(self) -> Result<AnchorService> {
        self.config.validate()?;

        let hasher = self
            .hasher
            .unwrap_or_else(|| hash::provider(self.config.hash_algorithm));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mut anchored = Vec::new();
        for record in self.store.load_anchored().await? {
            let batch = AnchoredBatch::from_record(hasher.as_ref(), record).map_err(|e| {
                error!(error = %e, "Stored anchored batch failed to load");
                e
            })?;
            anchored.push(Arc::new(batch));
        }

        let mut open = self.store.load_pending().await?.unwrap_or_default();
        let today = utc_midnight(clock.now_millis());
        let interrupted: Vec<PendingBatch> = open
            .closing
            .take()
            .into_iter()
            .chain(mem::take(&mut open.unsaved))
            .collect();
        for batch in interrupted {
            recover_interrupted(hasher.as_ref(), &anchored, &mut open, batch, today);
        }

        info!(
            hash = %hasher.algorithm(),
            network = %self.adapter.network(),
            simulated = self.adapter.is_simulated(),
            anchored_batches = anchored.len(),
            pending = open.leaf_count(),
            "Anchor service opened"
        );

        Ok(AnchorService {
            config: self.config,
            hasher,
            adapter: self.adapter,
            store: self.store,
            clock,
            open: Mutex::new(open),
            anchored: RwLock::new(anchored),
            close_lock: Mutex::new(()),
            anchored_save_lock: Mutex::new(()),
        })
    }
}

/// Decide what to do with a batch whose close never finished.
fn recover_interrupted(
    hasher: &dyn HashProvider,
    anchored: &[Arc<AnchoredBatch>],
    open: &mut OpenBatches,
    batch: PendingBatch,
    today: i64,
) {
    let already_anchored = batch
        .root(hasher)
        .is_some_and(|r| anchored.iter().any(|a| a.merkle_root == r));

    if already_anchored {
        info!(
            day = ?batch.day_timestamp,
            "Interrupted close had already been anchored, discarding open copy"
        );
    } else if !batch.is_empty() {
        warn!(
            day = ?batch.day_timestamp,
            leaf_count = batch.len(),
            "Recovered batch from interrupted close, will retry"
        );
        reopen(open, batch, today);
    }
}

/// Return an unanchored batch to the open set without mixing days.
///
/// Batches from before `today` go to the stalled list, never back into
/// pending, so a stale batch cannot absorb new events.
fn reopen(open: &mut OpenBatches, mut batch: PendingBatch, today: i64) {
    if !open.pending.is_empty() && open.pending.day_timestamp == batch.day_timestamp {
        // Same day: earlier leaves go first
        batch.leaves.append(&mut open.pending.leaves);
        open.pending = batch;
    } else if open.pending.is_empty() && open.stalled.is_empty() && !batch.is_stale(today) {
        open.pending = batch;
    } else {
        open.stall(batch);
    }
}

/// Collects consent events into daily batches and anchors them.
pub struct AnchorService {
    config: AnchorConfig,
    hasher: Arc<dyn HashProvider>,
    adapter: Arc<dyn ChainAdapter>,
    store: Arc<dyn BatchStore>,
    clock: Arc<dyn Clock>,
    open: Mutex<OpenBatches>,
    anchored: RwLock<Vec<Arc<AnchoredBatch>>>,
    close_lock: Mutex<()>,
    anchored_save_lock: Mutex<()>,
}

impl AnchorService {
    pub fn builder(
        adapter: Arc<dyn ChainAdapter>,
        store: Arc<dyn BatchStore>,
    ) -> AnchorServiceBuilder {
        AnchorServiceBuilder {
            config: AnchorConfig::default(),
            adapter,
            store,
            hasher: None,
            clock: None,
        }
    }

    pub fn hasher(&self) -> &dyn HashProvider {
        self.hasher.as_ref()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Record one consent event and return its leaf hash.
    ///
    /// If the pending batch belongs to an earlier UTC day, it is anchored
    /// before the new event is appended. A failed rollover does not fail
    /// the call: the old batch stays open and the event starts today's batch.
    pub async fn record_consent(&self, event: ConsentEvent) -> Result<RecordedConsent> {
        event.validate(self.config.max_field_len)?;
        let leaf_hash = event.leaf_hash(self.hasher.as_ref());

        let mut rollover = Rollover::None;
        let (mut open, now, today) = loop {
            {
                let mut open = self.open.lock().await;
                // Read under the lock so the day reflects when the event
                // got its turn, not when it started waiting
                let now = self.clock.now_millis();
                let today = utc_midnight(now);
                if !open.pending.is_stale(today) {
                    break (open, now, today);
                }

                let stale = mem::take(&mut open.pending);
                info!(
                    day = ?stale.day_timestamp,
                    today,
                    leaf_count = stale.len(),
                    "Day changed, rolling over pending batch"
                );
                open.stall(stale);
            }
            rollover = self.anchor_stalled().await;
        };

        if open.pending.is_empty() {
            open.pending.day_timestamp = Some(today);
        }
        let day_timestamp = open.pending.day_timestamp.unwrap_or(today);

        open.pending.leaves.push(BatchLeaf {
            leaf_hash,
            event,
            added_at_millis: now,
        });
        debug!(
            leaf = %leaf_hash,
            day = day_timestamp,
            count = open.pending.len(),
            "Leaf recorded"
        );

        let persisted = self.persist_open(&open).await;

        Ok(RecordedConsent {
            leaf_hash,
            day_timestamp,
            persisted,
            rollover,
        })
    }

    /// Anchor the oldest open batch.
    ///
    /// Returns `NothingToAnchor` without touching state when everything is
    /// anchored, so calling it repeatedly is safe. On adapter failure or
    /// timeout the batch is reopened with all its leaves and the error is
    /// returned.
    pub async fn close_batch(&self) -> Result<CloseOutcome> {
        self.close_next(false).await
    }

    /// Close batches until nothing is left or an attempt fails.
    pub async fn flush(&self) -> Result<Vec<BatchSummary>> {
        let mut anchored = Vec::new();
        loop {
            match self.close_batch().await {
                Ok(CloseOutcome::Anchored { summary, .. }) => anchored.push(summary),
                Ok(CloseOutcome::NothingToAnchor) => return Ok(anchored),
                Err(e) => {
                    warn!(anchored = anchored.len(), error = %e, "Flush stopped early");
                    return Err(e);
                }
            }
        }
    }

    /// Anchor every stalled batch, stopping at the first failure.
    async fn anchor_stalled(&self) -> Rollover {
        let mut batches = Vec::new();
        loop {
            match self.close_next(true).await {
                Ok(CloseOutcome::Anchored { summary, .. }) => batches.push(summary),
                Ok(CloseOutcome::NothingToAnchor) => return Rollover::Anchored { batches },
                Err(e) => {
                    warn!(error = %e, "Rollover anchoring failed, stale batch kept open");
                    return Rollover::Deferred {
                        reason: e.to_string(),
                    };
                }
            }
        }
    }

    async fn close_next(&self, stalled_only: bool) -> Result<CloseOutcome> {
        let _closing = self.close_lock.lock().await;

        let batch = {
            let mut open = self.open.lock().await;

            // A previous close was cancelled
            if let Some(leftover) = open.closing.take() {
                self.settle_leftover(&mut open, leftover);
            }

            let batch = if !open.stalled.is_empty() {
                open.stalled.remove(0)
            } else if stalled_only || open.pending.is_empty() {
                debug!("Nothing to anchor");
                return Ok(CloseOutcome::NothingToAnchor);
            } else {
                mem::take(&mut open.pending)
            };

            open.closing = Some(batch.clone());
            batch
        };

        match self.anchor(&batch).await {
            Ok(anchored) => {
                let summary = anchored.summary();
                // Published before the next await, so a cancelled close is
                // recognized as anchored and never committed again
                self.anchored.write().push(anchored);

                let open_saved = {
                    let mut open = self.open.lock().await;
                    if let Some(done) = open.closing.take() {
                        open.unsaved.push(done);
                    }
                    self.persist_open(&open).await
                };
                let persisted = self.persist_anchored().await && open_saved;

                info!(
                    root = %summary.merkle_root,
                    day = summary.day_timestamp,
                    leaf_count = summary.leaf_count,
                    external_id = %summary.receipt.external_id,
                    persisted,
                    "Batch anchored"
                );
                Ok(CloseOutcome::Anchored { summary, persisted })
            }
            Err(e) => {
                error!(
                    day = ?batch.day_timestamp,
                    leaf_count = batch.len(),
                    error = %e,
                    "Batch close failed, leaves kept for retry"
                );
                let mut open = self.open.lock().await;
                if let Some(batch) = open.closing.take() {
                    let today = utc_midnight(self.clock.now_millis());
                    reopen(&mut open, batch, today);
                }
                self.persist_open(&open).await;
                Err(e)
            }
        }
    }

    /// Put back the batch of a close that was cancelled.
    ///
    /// If its commit had already succeeded the batch is anchored and only
    /// waits for the anchored list to be saved. Otherwise it is open again.
    fn settle_leftover(&self, open: &mut OpenBatches, leftover: PendingBatch) {
        let root = leftover.root(self.hasher.as_ref());
        let anchored = root.is_some_and(|r| {
            self.anchored.read().iter().any(|a| a.merkle_root == r)
        });

        if anchored {
            debug!(day = ?leftover.day_timestamp, "Cancelled close had already anchored");
            open.unsaved.push(leftover);
        } else {
            warn!(day = ?leftover.day_timestamp, "Reopening batch from cancelled close");
            let today = utc_midnight(self.clock.now_millis());
            reopen(open, leftover, today);
        }
    }

    /// Build the tree, commit the root, and produce the anchored batch.
    async fn anchor(&self, batch: &PendingBatch) -> Result<Arc<AnchoredBatch>> {
        let day_timestamp = batch
            .day_timestamp
            .unwrap_or_else(|| utc_midnight(self.clock.now_millis()));

        let tree = MerkleTree::build(self.hasher.as_ref(), &batch.leaf_hashes());
        let merkle_root = tree
            .root()
            .ok_or_else(|| AnchorError::Validation("cannot anchor an empty batch".into()))?;
        let pointer = storage_pointer(
            self.hasher.as_ref(),
            day_timestamp,
            &merkle_root,
            &batch.leaves,
        )?;

        let request = CommitRequest {
            merkle_root,
            storage_pointer: pointer,
            day_timestamp,
            leaf_count: batch.len() as u64,
        };

        info!(
            network = %self.adapter.network(),
            root = %merkle_root,
            day = day_timestamp,
            leaf_count = request.leaf_count,
            "Committing batch root"
        );

        let timeout = self.config.commit_timeout();
        let receipt = match tokio::time::timeout(timeout, self.adapter.commit(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(AnchorError::Timeout(self.config.commit_timeout_ms)),
        };

        Ok(Arc::new(AnchoredBatch {
            merkle_root,
            storage_pointer: pointer,
            day_timestamp,
            leaves: batch.leaves.clone(),
            tree,
            receipt,
            revoked: false,
        }))
    }

    /// Flag an anchored batch as revoked.
    ///
    /// Nothing is deleted locally or on the ledger. Returns false if no
    /// anchored batch has this root. A persistence error leaves the flag
    /// set in memory.
    pub async fn revoke(&self, merkle_root: &Hash256) -> Result<bool> {
        let changed = {
            let mut anchored = self.anchored.write();
            let Some(slot) = anchored.iter_mut().find(|b| &b.merkle_root == merkle_root) else {
                return Ok(false);
            };
            if slot.revoked {
                false
            } else {
                let mut revoked = (**slot).clone();
                revoked.revoked = true;
                *slot = Arc::new(revoked);
                true
            }
        };

        if changed {
            info!(root = %merkle_root, "Batch revoked");
            if !self.persist_anchored().await {
                return Err(AnchorError::Persistence(format!(
                    "revocation of {merkle_root} not saved"
                )));
            }
        }
        Ok(true)
    }

    /// Write the full in-memory state to the store.
    pub async fn persist(&self) -> Result<()> {
        self.save_anchored().await?;
        let open = self.open.lock().await;
        self.store.save_pending(&open).await
    }

    /// The current pending batch.
    pub async fn batch_info(&self) -> BatchInfo {
        let open = self.open.lock().await;
        BatchInfo {
            count: open.pending.len(),
            day_timestamp: open.pending.day_timestamp,
        }
    }

    pub async fn stats(&self) -> Stats {
        let pending_count = self.open.lock().await.leaf_count();
        let anchored = self.anchored.read();
        Stats {
            pending_count,
            anchored_batch_count: anchored.len(),
            total_anchored_leaves: anchored.iter().map(|b| b.leaves.len()).sum(),
            is_simulated_mode: self.adapter.is_simulated(),
        }
    }

    /// Summaries of all anchored batches, oldest first.
    pub fn all_batches(&self) -> Vec<BatchSummary> {
        self.anchored.read().iter().map(|b| b.summary()).collect()
    }

    fn anchored_snapshot(&self) -> Vec<Arc<AnchoredBatch>> {
        self.anchored.read().clone()
    }

    fn anchored_records(&self) -> Vec<StoredAnchoredBatch> {
        self.anchored.read().iter().map(|b| b.to_record()).collect()
    }

    async fn persist_open(&self, open: &OpenBatches) -> bool {
        match self.store.save_pending(open).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save open batches, in-memory state kept");
                false
            }
        }
    }

    /// Save the anchored list, then drop the batches it now covers from
    /// the unsaved backlog of the open state.
    async fn save_anchored(&self) -> Result<()> {
        let saved: HashSet<Hash256> = {
            // Snapshot under the save lock so the last write always wins
            // with the newest list
            let _saving = self.anchored_save_lock.lock().await;
            let records = self.anchored_records();
            self.store.save_anchored(&records).await?;
            records.iter().map(|r| r.merkle_root).collect()
        };

        let mut open = self.open.lock().await;
        let before = open.unsaved.len();
        let hasher = self.hasher.as_ref();
        open.unsaved
            .retain(|b| b.root(hasher).is_some_and(|r| !saved.contains(&r)));
        if open.unsaved.len() != before {
            // A failure here only leaves entries that reload discards
            self.persist_open(&open).await;
        }
        Ok(())
    }

    async fn persist_anchored(&self) -> bool {
        match self.save_anchored().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to save anchored batches, unsaved batches kept with open state"
                );
                false
            }
        }
    }
}

/// Result and query types returned by the anchor service.
use serde::{Deserialize, Serialize};

use crate::crypto::hash::Hash256;
use crate::state::models::BatchSummary;

/// What happened to a stale batch when a new day's event arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Rollover {
    /// The pending batch was already for today.
    None,
    /// Stale batches were anchored before the event was appended.
    Anchored { batches: Vec<BatchSummary> },
    /// Anchoring failed; the stale batch stays open for a later retry.
    Deferred { reason: String },
}

/// Returned by `record_consent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedConsent {
    pub leaf_hash: Hash256,
    /// Day the event was filed under.
    pub day_timestamp: i64,
    /// False when the store write failed. The event is still recorded in
    /// memory and will be written by the next successful save.
    pub persisted: bool,
    pub rollover: Rollover,
}

/// Returned by `close_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CloseOutcome {
    NothingToAnchor,
    Anchored {
        summary: BatchSummary,
        /// False when the anchored state could not be saved. The batch is
        /// anchored regardless; do not retry the close.
        persisted: bool,
    },
}

impl CloseOutcome {
    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            CloseOutcome::Anchored { summary, .. } => Some(summary),
            CloseOutcome::NothingToAnchor => None,
        }
    }
}

/// The current pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    pub count: usize,
    pub day_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Leaves not yet anchored, including in-flight and stalled batches.
    pub pending_count: usize,
    pub anchored_batch_count: usize,
    pub total_anchored_leaves: usize,
    pub is_simulated_mode: bool,
}

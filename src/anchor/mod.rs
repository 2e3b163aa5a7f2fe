/// Ledger anchoring for tamper-evident consent batches.
///
/// The anchor module defines the pluggable [`ChainAdapter`] seam: commit a
/// batch's Merkle root, get a receipt back, and later ask whether the root
/// is really there. Exactly one adapter is picked when the service is
/// built; there is no runtime fallback between adapters.
///
/// Provided adapters:
/// - `SimulatedAdapter`: in-process ledger producing synthetic receipts,
///   for tests and for hosts running without a wallet
///
/// Real ledger submission lives in the host and implements the same trait.
pub mod simulated;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::hash::Hash256;
use crate::error::Result;

pub use simulated::SimulatedAdapter;

/// Everything an adapter needs to anchor one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub merkle_root: Hash256,
    /// Hash of the serialized batch payload.
    pub storage_pointer: Hash256,
    /// Epoch-seconds of the batch's UTC midnight.
    pub day_timestamp: i64,
    pub leaf_count: u64,
}

/// Receipt returned after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Transaction hash or other ledger-side identifier.
    pub external_id: String,
    pub confirmed_at: DateTime<Utc>,
    /// Network name (e.g., "simulated", "sepolia").
    pub network: String,
    /// True when no real ledger was involved.
    pub is_simulated: bool,
}

/// Trait for pluggable ledger adapters.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Name of the network this adapter writes to.
    fn network(&self) -> &str;

    /// Whether receipts from this adapter are synthetic.
    fn is_simulated(&self) -> bool;

    /// Anchor a batch root. Either returns a receipt or fails without
    /// side effects the caller has to undo.
    async fn commit(&self, request: &CommitRequest) -> Result<Receipt>;

    /// Check whether `root` is present on the ledger.
    async fn confirm_exists(&self, root: &Hash256) -> Result<bool>;
}

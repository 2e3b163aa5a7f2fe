/// Batch models and their persisted forms.
///
/// Open batches are stored as-is. Anchored batches are stored without
/// their Merkle tree, which is rebuilt from the leaf list on load and
/// checked against the stored root.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::anchor::Receipt;
use crate::crypto::hash::{Hash256, HashProvider};
use crate::error::{AnchorError, Result};
use crate::event::ConsentEvent;
use crate::merkle::tree::MerkleTree;

/// Current persisted schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// One recorded consent event and its leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLeaf {
    pub leaf_hash: Hash256,
    pub event: ConsentEvent,
    pub added_at_millis: i64,
}

/// The open batch for one UTC day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PendingBatch {
    pub leaves: Vec<BatchLeaf>,
    /// Epoch-seconds of UTC midnight. None until the first leaf arrives.
    pub day_timestamp: Option<i64>,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// True when this batch holds leaves from a day before `today`.
    pub fn is_stale(&self, today: i64) -> bool {
        !self.is_empty() && self.day_timestamp.is_some_and(|day| day < today)
    }

    pub fn leaf_hashes(&self) -> Vec<Hash256> {
        self.leaves.iter().map(|l| l.leaf_hash).collect()
    }

    pub fn contains(&self, leaf: &Hash256) -> bool {
        self.leaves.iter().any(|l| &l.leaf_hash == leaf)
    }

    /// Merkle root this batch anchors to. None when empty.
    pub fn root(&self, hasher: &dyn HashProvider) -> Option<Hash256> {
        MerkleTree::build(hasher, &self.leaf_hashes()).root()
    }
}

/// Everything not yet anchored.
///
/// `pending` is the batch new events go into. `closing` is the batch whose
/// commit is in flight. `stalled` holds older days whose commit failed
/// after a newer day had already started, oldest first.
///
/// `unsaved` holds batches that are already committed but not yet in a
/// successfully written anchored list. They are not open; they stay here
/// only so a restart can recover them, and leave once the anchored list
/// covering them has been saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenBatches {
    pub pending: PendingBatch,
    pub closing: Option<PendingBatch>,
    pub stalled: Vec<PendingBatch>,
    pub unsaved: Vec<PendingBatch>,
}

impl OpenBatches {
    /// Leaves across pending, closing and stalled batches. Unsaved batches
    /// are anchored and not counted.
    pub fn leaf_count(&self) -> usize {
        self.pending.len()
            + self.closing.as_ref().map_or(0, |b| b.len())
            + self.stalled.iter().map(|b| b.len()).sum::<usize>()
    }

    /// Find the open batch holding `leaf`, if any.
    pub fn find(&self, leaf: &Hash256) -> Option<&PendingBatch> {
        std::iter::once(&self.pending)
            .chain(self.closing.as_ref())
            .chain(self.stalled.iter())
            .find(|b| b.contains(leaf))
    }

    /// Put a batch back into the stalled list, keeping day order.
    pub fn stall(&mut self, batch: PendingBatch) {
        let day = batch.day_timestamp;
        let at = self.stalled.partition_point(|b| b.day_timestamp <= day);
        self.stalled.insert(at, batch);
    }
}

/// Summary view of an anchored batch (tree and leaves omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub merkle_root: Hash256,
    pub day_timestamp: i64,
    pub leaf_count: usize,
    pub receipt: Receipt,
    pub revoked: bool,
}

/// Persisted form of an anchored batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnchoredBatch {
    pub merkle_root: Hash256,
    pub storage_pointer: Hash256,
    pub day_timestamp: i64,
    pub leaves: Vec<BatchLeaf>,
    pub receipt: Receipt,
    #[serde(default)]
    pub revoked: bool,
}

/// A closed, committed batch.
#[derive(Debug, Clone)]
pub struct AnchoredBatch {
    pub merkle_root: Hash256,
    pub storage_pointer: Hash256,
    pub day_timestamp: i64,
    pub leaves: Vec<BatchLeaf>,
    pub tree: MerkleTree,
    pub receipt: Receipt,
    /// Soft-delete marker for erasure requests. Nothing is removed.
    pub revoked: bool,
}

impl AnchoredBatch {
    /// Rebuild from the persisted form, checking the stored root.
    pub fn from_record(hasher: &dyn HashProvider, record: StoredAnchoredBatch) -> Result<Self> {
        let hashes: Vec<Hash256> = record.leaves.iter().map(|l| l.leaf_hash).collect();
        let tree = MerkleTree::build(hasher, &hashes);

        if tree.root() != Some(record.merkle_root) {
            return Err(AnchorError::Integrity(format!(
                "batch for day {} stores root {} but its leaves rebuild to {}",
                record.day_timestamp,
                record.merkle_root,
                tree.root()
                    .map_or_else(|| "nothing".to_string(), |r| r.to_string()),
            )));
        }

        Ok(Self {
            merkle_root: record.merkle_root,
            storage_pointer: record.storage_pointer,
            day_timestamp: record.day_timestamp,
            leaves: record.leaves,
            tree,
            receipt: record.receipt,
            revoked: record.revoked,
        })
    }

    pub fn to_record(&self) -> StoredAnchoredBatch {
        StoredAnchoredBatch {
            merkle_root: self.merkle_root,
            storage_pointer: self.storage_pointer,
            day_timestamp: self.day_timestamp,
            leaves: self.leaves.clone(),
            receipt: self.receipt.clone(),
            revoked: self.revoked,
        }
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            merkle_root: self.merkle_root,
            day_timestamp: self.day_timestamp,
            leaf_count: self.leaves.len(),
            receipt: self.receipt.clone(),
            revoked: self.revoked,
        }
    }

    pub fn contains(&self, leaf: &Hash256) -> bool {
        self.tree.contains(leaf)
    }
}

/// The payload a storage pointer commits to.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchPayload<'a> {
    day_timestamp: i64,
    merkle_root: &'a Hash256,
    leaves: &'a [BatchLeaf],
}

/// Hash of the serialized batch payload.
pub fn storage_pointer(
    hasher: &dyn HashProvider,
    day_timestamp: i64,
    merkle_root: &Hash256,
    leaves: &[BatchLeaf],
) -> Result<Hash256> {
    let payload = serde_json::to_vec(&BatchPayload {
        day_timestamp,
        merkle_root,
        leaves,
    })?;
    Ok(hasher.hash(&payload))
}

/// Envelope carrying a schema version alongside persisted data.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned<T> {
    pub schema_version: u32,
    pub data: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionHeader {
    schema_version: u32,
}

/// Serialize `data` at the current schema version.
pub fn encode<T: Serialize>(data: &T) -> Result<String> {
    let envelope = Versioned {
        schema_version: SCHEMA_VERSION,
        data,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode a versioned blob.
///
/// Blobs written by a newer schema are refused rather than misread.
pub fn decode<T: DeserializeOwned>(blob: &str) -> Result<T> {
    let header: VersionHeader = serde_json::from_str(blob)
        .map_err(|e| AnchorError::Persistence(format!("unreadable state blob: {e}")))?;

    if header.schema_version > SCHEMA_VERSION {
        return Err(AnchorError::Persistence(format!(
            "state blob has schema version {}, this build understands up to {}",
            header.schema_version, SCHEMA_VERSION
        )));
    }

    let envelope: Versioned<T> = serde_json::from_str(blob)
        .map_err(|e| AnchorError::Persistence(format!("corrupt state blob: {e}")))?;
    Ok(envelope.data)
}

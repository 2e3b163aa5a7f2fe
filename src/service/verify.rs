/// Inclusion queries against anchored and open batches.
///
/// Anchored batches are immutable once published, so lookups work on a
/// snapshot of `Arc`s and never block recording or closing.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AnchorService;
use crate::anchor::Receipt;
use crate::crypto::hash::Hash256;
use crate::merkle::proof::MerkleProof;
use crate::state::models::AnchoredBatch;

/// What the ledger said about a batch root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum OnChainStatus {
    /// The adapter found the root.
    Confirmed,
    /// The adapter answered and the root is not there.
    Missing,
    /// Not asked: simulated receipt, or confirmation disabled.
    Skipped,
    /// The adapter could not be reached.
    Unavailable(String),
}

/// Everything a third party needs to check one leaf against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    pub merkle_root: Hash256,
    pub storage_pointer: Hash256,
    pub day_timestamp: i64,
    pub proof: MerkleProof,
    pub receipt: Receipt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredProof {
    #[serde(flatten)]
    pub bundle: ProofBundle,
    /// The regenerated proof checks out against the batch root.
    pub local_verification: bool,
    pub on_chain: OnChainStatus,
    pub revoked: bool,
}

/// Result of `AnchorService::verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VerifyOutcome {
    Anchored(AnchoredProof),
    /// Recorded but not anchored yet.
    Pending {
        #[serde(rename = "dayTimestamp")]
        day_timestamp: Option<i64>,
    },
    NotFound,
}

/// Flat classification of a [`VerifyOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerifyStatus {
    /// Local proof valid and the ledger confirmed the root.
    AnchoredVerified,
    /// Local proof valid; the ledger was not or could not be asked.
    AnchoredLocalOnly,
    /// Local proof failed, or the ledger does not know the root.
    AnchoredMismatch,
    Pending,
    NotFound,
}

impl VerifyOutcome {
    pub fn status(&self) -> VerifyStatus {
        match self {
            VerifyOutcome::Anchored(p) if !p.local_verification => VerifyStatus::AnchoredMismatch,
            VerifyOutcome::Anchored(p) => match p.on_chain {
                OnChainStatus::Confirmed => VerifyStatus::AnchoredVerified,
                OnChainStatus::Missing => VerifyStatus::AnchoredMismatch,
                OnChainStatus::Skipped | OnChainStatus::Unavailable(_) => {
                    VerifyStatus::AnchoredLocalOnly
                }
            },
            VerifyOutcome::Pending { .. } => VerifyStatus::Pending,
            VerifyOutcome::NotFound => VerifyStatus::NotFound,
        }
    }

    pub fn is_anchored(&self) -> bool {
        matches!(self, VerifyOutcome::Anchored(_))
    }

    pub fn local_verification(&self) -> bool {
        match self {
            VerifyOutcome::Anchored(p) => p.local_verification,
            _ => false,
        }
    }

    pub fn proof(&self) -> Option<&MerkleProof> {
        match self {
            VerifyOutcome::Anchored(p) => Some(&p.bundle.proof),
            _ => None,
        }
    }
}

fn newest_containing(
    batches: &[Arc<AnchoredBatch>],
    leaf: &Hash256,
) -> Option<Arc<AnchoredBatch>> {
    batches.iter().rev().find(|b| b.contains(leaf)).cloned()
}

fn bundle_for(batch: &AnchoredBatch, leaf: &Hash256) -> Option<ProofBundle> {
    Some(ProofBundle {
        merkle_root: batch.merkle_root,
        storage_pointer: batch.storage_pointer,
        day_timestamp: batch.day_timestamp,
        proof: batch.tree.prove(leaf)?,
        receipt: batch.receipt.clone(),
    })
}

impl AnchorService {
    /// Look up a leaf and prove its inclusion.
    ///
    /// Anchored batches are searched newest first. A leaf that is only in
    /// an open batch reports `Pending`. On-chain confirmation is only
    /// requested for receipts from a real ledger.
    pub async fn verify(&self, leaf: &Hash256) -> VerifyOutcome {
        let batch = match newest_containing(&self.anchored_snapshot(), leaf) {
            Some(batch) => batch,
            None => {
                let pending_day = self
                    .open
                    .lock()
                    .await
                    .find(leaf)
                    .map(|b| b.day_timestamp);
                if let Some(day_timestamp) = pending_day {
                    debug!(leaf = %leaf, "Leaf is pending");
                    return VerifyOutcome::Pending { day_timestamp };
                }

                // A close may have finished between the two lookups
                match newest_containing(&self.anchored_snapshot(), leaf) {
                    Some(batch) => batch,
                    None => {
                        debug!(leaf = %leaf, "Leaf not found");
                        return VerifyOutcome::NotFound;
                    }
                }
            }
        };

        let Some(bundle) = bundle_for(&batch, leaf) else {
            return VerifyOutcome::NotFound;
        };
        let local_verification = bundle.proof.verify(self.hasher(), &batch.merkle_root);
        if !local_verification {
            warn!(leaf = %leaf, root = %batch.merkle_root, "Local proof failed");
        }

        let on_chain = if batch.receipt.is_simulated || !self.config.confirm_on_chain {
            OnChainStatus::Skipped
        } else {
            match self.adapter.confirm_exists(&batch.merkle_root).await {
                Ok(true) => OnChainStatus::Confirmed,
                Ok(false) => {
                    warn!(root = %batch.merkle_root, "Anchored root not found on ledger");
                    OnChainStatus::Missing
                }
                Err(e) => {
                    warn!(root = %batch.merkle_root, error = %e, "On-chain check failed");
                    OnChainStatus::Unavailable(e.to_string())
                }
            }
        };

        VerifyOutcome::Anchored(AnchoredProof {
            bundle,
            local_verification,
            on_chain,
            revoked: batch.revoked,
        })
    }

    /// Proof bundle for an anchored leaf, without contacting the ledger.
    pub fn proof_for(&self, leaf: &Hash256) -> Option<ProofBundle> {
        let batch = newest_containing(&self.anchored_snapshot(), leaf)?;
        bundle_for(&batch, leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn proof() -> AnchoredProof {
        AnchoredProof {
            bundle: ProofBundle {
                merkle_root: Hash256::new([1; 32]),
                storage_pointer: Hash256::new([2; 32]),
                day_timestamp: 0,
                proof: MerkleProof {
                    leaf: Hash256::new([1; 32]),
                    leaf_index: 0,
                    siblings: vec![],
                },
                receipt: Receipt {
                    external_id: "0x01".into(),
                    confirmed_at: Utc::now(),
                    network: "sepolia".into(),
                    is_simulated: false,
                },
            },
            local_verification: true,
            on_chain: OnChainStatus::Confirmed,
            revoked: false,
        }
    }

    #[test]
    fn test_status_classification() {
        let mut p = proof();
        assert_eq!(
            VerifyOutcome::Anchored(p.clone()).status(),
            VerifyStatus::AnchoredVerified
        );

        p.on_chain = OnChainStatus::Skipped;
        assert_eq!(
            VerifyOutcome::Anchored(p.clone()).status(),
            VerifyStatus::AnchoredLocalOnly
        );

        p.on_chain = OnChainStatus::Unavailable("timeout".into());
        assert_eq!(
            VerifyOutcome::Anchored(p.clone()).status(),
            VerifyStatus::AnchoredLocalOnly
        );

        p.on_chain = OnChainStatus::Missing;
        assert_eq!(
            VerifyOutcome::Anchored(p.clone()).status(),
            VerifyStatus::AnchoredMismatch
        );

        p.on_chain = OnChainStatus::Confirmed;
        p.local_verification = false;
        assert_eq!(
            VerifyOutcome::Anchored(p).status(),
            VerifyStatus::AnchoredMismatch
        );

        assert_eq!(
            VerifyOutcome::Pending { day_timestamp: None }.status(),
            VerifyStatus::Pending
        );
        assert_eq!(VerifyOutcome::NotFound.status(), VerifyStatus::NotFound);
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(VerifyOutcome::Anchored(proof())).unwrap();
        assert_eq!(json["status"], "anchored");
        assert_eq!(json["localVerification"], true);
        assert!(json["merkleRoot"].as_str().unwrap().starts_with("0x"));
        assert_eq!(json["onChain"]["state"], "confirmed");

        let json = serde_json::to_value(VerifyOutcome::Pending {
            day_timestamp: Some(86_400),
        })
        .unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["dayTimestamp"], 86_400);

        let json = serde_json::to_value(VerifyOutcome::NotFound).unwrap();
        assert_eq!(json["status"], "notFound");
    }
}

/// Merkle inclusion proof generation and verification.
///
/// Proofs carry sibling hashes only. Because pairs are combined in sorted
/// order, no left/right positions are needed, and a verifier can check a
/// proof knowing nothing but the root.
use serde::{Deserialize, Serialize};

use super::tree::{internal_hash, MerkleTree};
use crate::crypto::hash::{Hash256, HashProvider};

/// A Merkle inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub leaf: Hash256,
    /// Position of the leaf in the sorted level 0.
    pub leaf_index: usize,
    /// Sibling at each level, bottom-up.
    pub siblings: Vec<Hash256>,
}

impl MerkleProof {
    /// Check this proof against a root.
    pub fn verify(&self, hasher: &dyn HashProvider, root: &Hash256) -> bool {
        verify_inclusion(hasher, root, &self.leaf, &self.siblings)
    }
}

impl MerkleTree {
    /// Generate an inclusion proof for `leaf`.
    ///
    /// Returns None when the leaf is not in the tree. Absence is an
    /// ordinary outcome, not an error.
    pub fn prove(&self, leaf: &Hash256) -> Option<MerkleProof> {
        let index = self.position(leaf)?;
        let mut siblings = Vec::with_capacity(self.depth());
        let mut idx = index;

        for level in &self.levels[..self.depth()] {
            // Last node of an odd level is its own sibling
            let sibling = level.get(idx ^ 1).unwrap_or(&level[idx]);
            siblings.push(*sibling);
            idx /= 2;
        }

        Some(MerkleProof {
            leaf: *leaf,
            leaf_index: index,
            siblings,
        })
    }
}

/// Verify a proof given only a root, a leaf and the sibling path.
///
/// Usable without a tree, so proofs received from untrusted parties can
/// be checked against an anchored root.
pub fn verify_inclusion(
    hasher: &dyn HashProvider,
    root: &Hash256,
    leaf: &Hash256,
    siblings: &[Hash256],
) -> bool {
    let computed = siblings
        .iter()
        .fold(*leaf, |running, sibling| internal_hash(hasher, &running, sibling));
    &computed == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::{Keccak256Hasher, Sha256Hasher};

    fn leaves(n: u32) -> Vec<Hash256> {
        (0..n)
            .map(|i| Keccak256Hasher.hash(format!("event-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn test_proof_single_leaf() {
        let only = leaves(1)[0];
        let tree = MerkleTree::build(&Keccak256Hasher, &[only]);
        let proof = tree.prove(&only).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(proof.verify(&Keccak256Hasher, &tree.root().unwrap()));
    }

    #[test]
    fn test_proof_roundtrip_all_sizes() {
        for n in 1..=40 {
            let items = leaves(n);
            let tree = MerkleTree::build(&Keccak256Hasher, &items);
            let root = tree.root().unwrap();

            for leaf in &items {
                let proof = tree.prove(leaf).unwrap();
                assert_eq!(proof.siblings.len(), tree.depth());
                assert!(
                    verify_inclusion(&Keccak256Hasher, &root, leaf, &proof.siblings),
                    "proof failed for n={n} leaf={leaf}"
                );
            }
        }
    }

    #[test]
    fn test_five_leaves_three_siblings() {
        let items = leaves(5);
        let tree = MerkleTree::build(&Keccak256Hasher, &items);
        let proof = tree.prove(&items[2]).unwrap();
        assert_eq!(proof.siblings.len(), 3);
        assert!(proof.verify(&Keccak256Hasher, &tree.root().unwrap()));
    }

    #[test]
    fn test_odd_leaf_sibling_is_itself() {
        let a = Hash256::new([0x01; 32]);
        let b = Hash256::new([0x02; 32]);
        let c = Hash256::new([0x03; 32]);
        let tree = MerkleTree::build(&Sha256Hasher, &[a, b, c]);
        let proof = tree.prove(&c).unwrap();
        assert_eq!(proof.leaf_index, 2);
        assert_eq!(proof.siblings[0], c);
        assert!(proof.verify(&Sha256Hasher, &tree.root().unwrap()));
    }

    #[test]
    fn test_non_member_has_no_proof() {
        let items = leaves(6);
        let tree = MerkleTree::build(&Keccak256Hasher, &items);
        let outsider = Keccak256Hasher.hash(b"not recorded");
        assert!(tree.prove(&outsider).is_none());
    }

    #[test]
    fn test_empty_tree_has_no_proof() {
        let tree = MerkleTree::build(&Keccak256Hasher, &[]);
        assert!(tree.prove(&Hash256::default()).is_none());
    }

    #[test]
    fn test_wrong_root_fails() {
        let items = leaves(4);
        let tree = MerkleTree::build(&Keccak256Hasher, &items);
        let proof = tree.prove(&items[0]).unwrap();
        assert!(!proof.verify(&Keccak256Hasher, &Hash256::new([0xFF; 32])));
    }

    #[test]
    fn test_tampered_sibling_fails() {
        let items = leaves(7);
        let tree = MerkleTree::build(&Keccak256Hasher, &items);
        let root = tree.root().unwrap();
        let mut proof = tree.prove(&items[3]).unwrap();
        proof.siblings[1] = Hash256::new([0xAA; 32]);
        assert!(!proof.verify(&Keccak256Hasher, &root));
    }

    #[test]
    fn test_wrong_hasher_fails() {
        let items = leaves(3);
        let tree = MerkleTree::build(&Keccak256Hasher, &items);
        let proof = tree.prove(&items[1]).unwrap();
        assert!(!proof.verify(&Sha256Hasher, &tree.root().unwrap()));
    }

    #[test]
    fn test_uppercase_root_verifies() {
        let items = leaves(5);
        let tree = MerkleTree::build(&Keccak256Hasher, &items);
        let proof = tree.prove(&items[4]).unwrap();
        let shouted: Hash256 = tree.root().unwrap().to_hex().to_uppercase()[2..]
            .parse()
            .unwrap();
        assert!(proof.verify(&Keccak256Hasher, &shouted));
    }

    #[test]
    fn test_proof_json_shape() {
        let items = leaves(2);
        let tree = MerkleTree::build(&Keccak256Hasher, &items);
        let proof = tree.prove(&items[0]).unwrap();
        let json = serde_json::to_value(&proof).unwrap();
        assert!(json["leaf"].as_str().unwrap().starts_with("0x"));
        assert_eq!(json["siblings"].as_array().unwrap().len(), 1);
        assert!(json.get("leafIndex").is_some());
    }
}

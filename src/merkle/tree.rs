/// Sorted-pair Merkle tree over consent leaf hashes.
///
/// Construction rules (these must match the on-chain verifier exactly):
///   level 0             = leaf hashes sorted ascending by byte value
///   internal_hash(a, b) = H(min(a, b) || max(a, b))
///
/// If a level has an odd number of nodes, the last node is paired with
/// itself: the duplicate is a real second input to the hash, not a
/// promotion. Because level 0 is sorted, the root depends only on the
/// multiset of leaves, not on the order they were recorded in.
use crate::crypto::hash::{Hash256, HashProvider};

/// Combine two nodes, lower byte value first.
pub fn internal_hash(hasher: &dyn HashProvider, a: &Hash256, b: &Hash256) -> Hash256 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut input = [0u8; 64];
    input[..32].copy_from_slice(low.as_bytes());
    input[32..].copy_from_slice(high.as_bytes());
    hasher.hash(&input)
}

/// A Merkle tree held as explicit levels.
///
/// Never persisted: it is a pure function of its leaves and is rebuilt
/// whenever a batch is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// levels[0] = sorted leaves, levels[last] = [root].
    pub(crate) levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes in any order.
    ///
    /// Duplicates are kept; each occupies its own position.
    pub fn build(hasher: &dyn HashProvider, leaves: &[Hash256]) -> Self {
        if leaves.is_empty() {
            return Self {
                levels: vec![vec![]],
            };
        }

        let mut sorted = leaves.to_vec();
        sorted.sort_unstable();
        let mut levels = vec![sorted];

        loop {
            let current = match levels.last() {
                Some(level) if level.len() > 1 => level,
                _ => break,
            };

            let next: Vec<Hash256> = current
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    // Odd node: paired with itself
                    let right = pair.get(1).unwrap_or(left);
                    internal_hash(hasher, left, right)
                })
                .collect();

            levels.push(next);
        }

        Self { levels }
    }

    /// The Merkle root. None for an empty tree.
    pub fn root(&self) -> Option<Hash256> {
        match self.levels.last() {
            Some(level) if level.len() == 1 => level.first().copied(),
            _ => None,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    /// Sorted leaf hashes.
    pub fn leaves(&self) -> &[Hash256] {
        self.levels.first().map_or(&[], |l| l.as_slice())
    }

    /// Number of combination rounds between the leaves and the root.
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Get all levels (for debugging/testing).
    pub fn levels(&self) -> &[Vec<Hash256>] {
        &self.levels
    }

    /// Index of the first occurrence of `leaf` in level 0.
    pub fn position(&self, leaf: &Hash256) -> Option<usize> {
        let leaves = self.leaves();
        let index = leaves.partition_point(|l| l < leaf);
        (leaves.get(index) == Some(leaf)).then_some(index)
    }

    pub fn contains(&self, leaf: &Hash256) -> bool {
        self.position(leaf).is_some()
    }
}

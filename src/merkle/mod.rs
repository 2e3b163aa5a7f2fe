/// Merkle commitments over consent batches.
///
/// `tree` builds the sorted-pair tree, `proof` produces and checks
/// inclusion proofs against a bare root.
pub mod proof;
pub mod tree;

pub use proof::{verify_inclusion, MerkleProof};
pub use tree::{internal_hash, MerkleTree};

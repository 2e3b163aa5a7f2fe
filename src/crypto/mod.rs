/// Hashing primitives for consent anchoring.
pub mod hash;

/// 256-bit hashing for consent anchoring.
///
/// Every digest in the system (leaf hashes, interior Merkle nodes, storage
/// pointers) goes through a [`HashProvider`] chosen once at construction.
/// The provider must match the hash the ledger uses to check roots, so an
/// unknown algorithm name is a configuration error, never a silent fallback.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::error::{AnchorError, Result};

/// A 32-byte digest.
///
/// Renders as `0x` followed by 64 lowercase hex digits. Parsing accepts any
/// case, with or without the prefix, so two spellings of the same digest
/// always compare equal. Ordering is by byte value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Lowercase `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({self})")
    }
}

impl FromStr for Hash256 {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 64 {
            return Err(AnchorError::Validation(format!(
                "hash must be 64 hex digits, got {}",
                digits.len()
            )));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| AnchorError::Validation(format!("invalid hash hex: {e}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Supported digest primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Ethereum-compatible Keccak-256 (not NIST SHA3-256).
    #[default]
    Keccak256,
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Keccak256 => "keccak256",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keccak256" | "keccak-256" => Ok(HashAlgorithm::Keccak256),
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(AnchorError::Config(format!(
                "unsupported hash algorithm '{other}'"
            ))),
        }
    }
}

/// Deterministic 256-bit hashing capability.
///
/// Implementations must be pure: equal input, equal output, no side
/// effects. The empty input hashes to the primitive's empty digest.
pub trait HashProvider: Send + Sync {
    fn algorithm(&self) -> HashAlgorithm;

    fn hash(&self, data: &[u8]) -> Hash256;
}

/// Keccak-256 as used by EVM ledgers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256Hasher;

impl HashProvider for Keccak256Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Keccak256
    }

    fn hash(&self, data: &[u8]) -> Hash256 {
        Hash256(Keccak256::digest(data).into())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl HashProvider for Sha256Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn hash(&self, data: &[u8]) -> Hash256 {
        Hash256(Sha256::digest(data).into())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl HashProvider for Blake3Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Blake3
    }

    fn hash(&self, data: &[u8]) -> Hash256 {
        Hash256(blake3::hash(data).into())
    }
}

/// Build the provider for a configured algorithm.
pub fn provider(algorithm: HashAlgorithm) -> Arc<dyn HashProvider> {
    match algorithm {
        HashAlgorithm::Keccak256 => Arc::new(Keccak256Hasher),
        HashAlgorithm::Sha256 => Arc::new(Sha256Hasher),
        HashAlgorithm::Blake3 => Arc::new(Blake3Hasher),
    }
}

/// Resolve a provider from its configured name.
pub fn provider_named(name: &str) -> Result<Arc<dyn HashProvider>> {
    Ok(provider(name.parse()?))
}

/// Persistence boundary for consent batches.
///
/// A store holds two versioned blobs:
/// - the open batches (pending, in-flight, stalled)
/// - the anchored batch list, each entry without its Merkle tree
///
/// Stores hold no business logic. Implementations only move blobs; the
/// typed load/save methods are provided on top of `read_blob`/`write_blob`.
pub mod memory;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use models::{decode, encode, OpenBatches, StoredAnchoredBatch};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Which blob is being read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKey {
    Pending,
    Anchored,
}

impl BlobKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKey::Pending => "pending",
            BlobKey::Anchored => "anchored",
        }
    }
}

/// Trait for pluggable batch stores.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Read a raw blob. None if it was never written.
    async fn read_blob(&self, key: BlobKey) -> Result<Option<String>>;

    /// Replace a raw blob.
    async fn write_blob(&self, key: BlobKey, blob: &str) -> Result<()>;

    async fn load_pending(&self) -> Result<Option<OpenBatches>> {
        match self.read_blob(BlobKey::Pending).await? {
            Some(blob) => Ok(Some(decode(&blob)?)),
            None => Ok(None),
        }
    }

    async fn save_pending(&self, open: &OpenBatches) -> Result<()> {
        let blob = encode(open)?;
        self.write_blob(BlobKey::Pending, &blob).await
    }

    /// Anchored batches, oldest first.
    async fn load_anchored(&self) -> Result<Vec<StoredAnchoredBatch>> {
        match self.read_blob(BlobKey::Anchored).await? {
            Some(blob) => decode(&blob),
            None => Ok(Vec::new()),
        }
    }

    async fn save_anchored(&self, batches: &[StoredAnchoredBatch]) -> Result<()> {
        let blob = encode(&batches)?;
        self.write_blob(BlobKey::Anchored, &blob).await
    }
}

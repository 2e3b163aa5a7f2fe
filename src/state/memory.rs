/// In-memory batch store.
///
/// Blobs go through the same versioned encoding as durable stores, so the
/// persisted format is exercised even in tests. Read and write failures
/// can be switched on, and writes slowed down per key, to drive the
/// service's persistence error paths.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BatchStore, BlobKey};
use crate::error::{AnchorError, Result};

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<BlobKey, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_keys: Mutex<HashSet<BlobKey>>,
    write_delays: Mutex<HashMap<BlobKey, Duration>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail writes of one blob only.
    pub fn set_fail_writes_for(&self, key: BlobKey, fail: bool) {
        let mut keys = self.failing_keys.lock();
        if fail {
            keys.insert(key);
        } else {
            keys.remove(&key);
        }
    }

    /// Sleep before every write of `key`. Zero removes the delay.
    pub fn set_write_delay(&self, key: BlobKey, delay: Duration) {
        let mut delays = self.write_delays.lock();
        if delay.is_zero() {
            delays.remove(&key);
        } else {
            delays.insert(key, delay);
        }
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw blob, for inspecting or corrupting persisted state in tests.
    pub fn blob(&self, key: BlobKey) -> Option<String> {
        self.blobs.lock().get(&key).cloned()
    }

    pub fn put_blob(&self, key: BlobKey, blob: &str) {
        self.blobs.lock().insert(key, blob.to_string());
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn read_blob(&self, key: BlobKey) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AnchorError::Persistence(format!(
                "read of '{}' failed",
                key.as_str()
            )));
        }
        Ok(self.blobs.lock().get(&key).cloned())
    }

    async fn write_blob(&self, key: BlobKey, blob: &str) -> Result<()> {
        let delay = self.write_delays.lock().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_writes.load(Ordering::SeqCst) || self.failing_keys.lock().contains(&key) {
            return Err(AnchorError::Persistence(format!(
                "write of '{}' failed",
                key.as_str()
            )));
        }
        self.blobs.lock().insert(key, blob.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::models::{OpenBatches, PendingBatch};

    #[tokio::test]
    async fn test_empty_store_loads_nothing() {
        let store = MemoryStore::new();
        assert!(store.load_pending().await.unwrap().is_none());
        assert!(store.load_anchored().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_roundtrip() {
        let store = MemoryStore::new();
        let open = OpenBatches {
            pending: PendingBatch {
                leaves: vec![],
                day_timestamp: Some(86_400),
            },
            ..OpenBatches::default()
        };
        store.save_pending(&open).await.unwrap();
        assert_eq!(store.load_pending().await.unwrap(), Some(open));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.save_pending(&OpenBatches::default()).await.unwrap_err();
        assert!(matches!(err, AnchorError::Persistence(_)));
        assert!(store.blob(BlobKey::Pending).is_none());

        store.set_fail_reads(true);
        assert!(store.load_anchored().await.is_err());
    }

    #[tokio::test]
    async fn test_per_key_write_failure() {
        let store = MemoryStore::new();
        store.set_fail_writes_for(BlobKey::Anchored, true);
        assert!(store.save_anchored(&[]).await.is_err());
        store.save_pending(&OpenBatches::default()).await.unwrap();
        assert!(store.blob(BlobKey::Pending).is_some());

        store.set_fail_writes_for(BlobKey::Anchored, false);
        store.save_anchored(&[]).await.unwrap();
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_write_delay_holds_back_the_write() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.set_write_delay(BlobKey::Pending, Duration::from_millis(200));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.save_pending(&OpenBatches::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.blob(BlobKey::Pending).is_none());

        writer.await.unwrap().unwrap();
        assert!(store.blob(BlobKey::Pending).is_some());
    }
}

//! Response cache for offline replay.
//!
//! Snapshots of successful calls are kept as one JSON object under the
//! `"uql"` storage key, mapping caller ids to full envelopes. The whole map
//! is decoded on every read and re-encoded on every write; there is no TTL,
//! no size bound and no eviction.
//!
//! Two writers racing on the same store can lose each other's update (plain
//! read-modify-write, no locking). Cached results are a best-effort fallback,
//! so last-writer-wins is accepted.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::api::types::CallOutput;
use crate::storage::{Storage, StorageError, CACHE_KEY};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Stored cache blob is malformed: {0}")]
    Malformed(serde_json::Error),
    #[error("Cache entry does not match the requested shape: {0}")]
    Snapshot(serde_json::Error),
}

/// Keyed store of prior call results.
#[derive(Clone)]
pub struct ResponseCache {
    storage: Arc<dyn Storage>,
}

impl ResponseCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Every cached snapshot, keyed by call id.
    ///
    /// An absent blob reads as an empty map. A blob that is present but not a
    /// JSON object is reported as [`CacheError::Malformed`].
    pub fn read_all(&self) -> Result<BTreeMap<String, Value>, CacheError> {
        match self.storage.get(CACHE_KEY)? {
            None => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(CacheError::Malformed),
        }
    }

    /// The snapshot stored under `id`, decoded as an envelope of `T`.
    pub fn read<T: DeserializeOwned>(&self, id: &str) -> Result<Option<CallOutput<T>>, CacheError> {
        match self.read_all()?.remove(id) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(CacheError::Snapshot),
        }
    }

    /// Upsert the snapshot for `id`, or delete it when `output` is `None`.
    pub fn write<T: Serialize>(
        &self,
        id: &str,
        output: Option<&CallOutput<T>>,
    ) -> Result<(), CacheError> {
        let mut entries = self.read_all()?;
        match output {
            Some(output) => {
                let value = serde_json::to_value(output).map_err(CacheError::Snapshot)?;
                entries.insert(id.to_string(), value);
            }
            None => {
                entries.remove(id);
            }
        }
        self.save(&entries)
    }

    /// Drop every snapshot.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.storage.delete(CACHE_KEY)?;
        Ok(())
    }

    fn save(&self, entries: &BTreeMap<String, Value>) -> Result<(), CacheError> {
        let raw = serde_json::to_string(entries).map_err(CacheError::Snapshot)?;
        self.storage.set(CACHE_KEY, &raw)?;
        Ok(())
    }
}

//! String key-value storage used for the auth token and the response cache.
//!
//! Everything that persists client state goes through the [`Storage`] trait so
//! the dispatcher and session can be handed an in-memory store under test and
//! a file or keychain store in the demo binary.

pub mod file;
pub mod keychain;
pub mod memory;

pub use file::FileStorage;
pub use keychain::KeychainStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "xt";

/// Storage key holding the serialized response cache.
pub const CACHE_KEY: &str = "uql";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Keychain operation failed: {0}")]
    Keychain(String),
}

/// Synchronous get/set/delete over string keys.
///
/// Implementations do whole-value reads and writes only. There is no
/// compare-and-swap, so concurrent read-modify-write cycles can lose updates.
pub trait Storage: Send + Sync {
    /// Returns `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Idempotent: deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

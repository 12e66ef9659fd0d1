//! Client for a UQL endpoint: one POST per call carrying an intent name,
//! arguments and a field selection, answered with a uniform envelope.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uql_client::{CallInput, CallOutput, ClientConfig, Fields, MemoryStorage, UqlClient};
//!
//! let client = UqlClient::new(&ClientConfig::from_env(), Arc::new(MemoryStorage::new()));
//! let input: CallInput = CallInput::new("models.note.selectmany")
//!     .id("notes")
//!     .offline_fallback(true)
//!     .fields(Fields::All);
//! let out: CallOutput = client.call(&input).await;
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod session;
pub mod storage;

pub use api::types::{AuthPayload, Credentials, Note};
pub use api::{
    Attachment, CallError, CallInput, CallOutput, FieldSelection, Fields, Meta, Network, UqlClient,
    User,
};
pub use cache::{CacheError, ResponseCache};
pub use config::ClientConfig;
pub use session::{Session, UserState};
pub use storage::{FileStorage, KeychainStorage, MemoryStorage, Storage, StorageError};

//! Bearer token storage and the `Authorization` header derived from it.
//!
//! The token lives under the `"xt"` key of the injected local storage. There
//! is no expiry tracking and no refresh; a token stays until logout.

use thiserror::Error;

use crate::storage::{Storage, StorageError, TOKEN_KEY};

/// Header name for authenticated requests.
pub const AUTH_HEADER: &str = "Authorization";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No auth token stored")]
    MissingToken,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Read the stored token. Returns `None` if absent or empty.
pub fn auth_token(storage: &dyn Storage) -> Result<Option<String>, StorageError> {
    Ok(storage.get(TOKEN_KEY)?.filter(|t| !t.is_empty()))
}

/// Persist a token, replacing any previous one.
pub fn store_auth_token(storage: &dyn Storage, token: &str) -> Result<(), StorageError> {
    storage.set(TOKEN_KEY, token)
}

/// Remove the stored token. Idempotent.
pub fn delete_auth_token(storage: &dyn Storage) -> Result<(), StorageError> {
    storage.delete(TOKEN_KEY)
}

/// Header value for a token: `Token <token>`.
pub fn token_header_value(token: &str) -> String {
    format!("Token {}", token)
}

/// `("Authorization", "Token <token>")` for the stored token.
///
/// Fails with [`AuthError::MissingToken`] when nothing is stored; callers
/// that may run logged out must check [`auth_token`] first.
pub fn auth_header(storage: &dyn Storage) -> Result<(&'static str, String), AuthError> {
    let token = auth_token(storage)?.ok_or(AuthError::MissingToken)?;
    Ok((AUTH_HEADER, token_header_value(&token)))
}

//! Session state: who is logged in, and the calls that change it.
//!
//! `bootstrap()` is meant to run once at startup. It resolves the user from
//! the stored token, falling back to the offline cache, so a client that
//! starts without network still knows who was logged in last.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use crate::api::auth;
use crate::api::types::{AuthPayload, CallInput, CallOutput, Credentials, Fields, User};
use crate::api::UqlClient;
use crate::storage::{Storage, StorageError};

/// Cache id under which the bootstrap lookup is stored.
pub const AUTH_USER_CACHE_ID: &str = "auth_user";

/// What the session knows about the current user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserState {
    /// `bootstrap()` has not completed yet.
    Unchecked,
    /// Checked: no token, or the token did not resolve to a user.
    Anonymous,
    Authenticated(User),
}

impl UserState {
    pub fn label(&self) -> &str {
        match self {
            UserState::Unchecked => "Unchecked",
            UserState::Anonymous => "Anonymous",
            UserState::Authenticated(_) => "Authenticated",
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            UserState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, UserState::Authenticated(_))
    }
}

/// Auth/session helper over a dispatcher and a local store.
pub struct Session {
    api: UqlClient,
    /// Local storage holding the auth token.
    storage: Arc<dyn Storage>,
    user: RwLock<UserState>,
}

impl Session {
    pub fn new(api: UqlClient, storage: Arc<dyn Storage>) -> Self {
        Self {
            api,
            storage,
            user: RwLock::new(UserState::Unchecked),
        }
    }

    pub fn api(&self) -> &UqlClient {
        &self.api
    }

    /// Snapshot of the current user state.
    pub async fn user(&self) -> UserState {
        self.user.read().await.clone()
    }

    /// Stored token, treating storage failures as "no token".
    pub fn token(&self) -> Option<String> {
        match auth::auth_token(self.storage.as_ref()) {
            Ok(token) => token,
            Err(e) => {
                log::warn!("Failed to read auth token: {}", e);
                None
            }
        }
    }

    /// Create an account with `functions.signup`.
    ///
    /// The returned token is persisted only when the call succeeded and the
    /// token is non-empty. The envelope is returned either way.
    pub async fn signup(&self, email: &str, password: &str) -> CallOutput<AuthPayload> {
        self.authenticate("functions.signup", email, password).await
    }

    /// Log in with `functions.login`. Same token rule as [`Session::signup`].
    pub async fn login(&self, email: &str, password: &str) -> CallOutput<AuthPayload> {
        self.authenticate("functions.login", email, password).await
    }

    /// Forget the stored token and mark the session anonymous.
    ///
    /// Local only: the endpoint has no logout intent.
    pub async fn logout(&self) -> Result<(), StorageError> {
        log::info!("Logging out");
        auth::delete_auth_token(self.storage.as_ref())?;
        *self.user.write().await = UserState::Anonymous;
        Ok(())
    }

    /// Resolve the current user from the stored token.
    ///
    /// Without a token the session becomes `Anonymous` without any request.
    /// With one, `models.user.find` is dispatched with offline fallback under
    /// [`AUTH_USER_CACHE_ID`].
    pub async fn bootstrap(&self) -> UserState {
        let state = match self.token() {
            None => {
                log::info!("No stored token, session is anonymous");
                UserState::Anonymous
            }
            Some(token) => self.fetch_user(&token).await,
        };
        *self.user.write().await = state.clone();
        state
    }

    async fn fetch_user(&self, token: &str) -> UserState {
        let input = CallInput::new("models.user.find")
            .id(AUTH_USER_CACHE_ID)
            .offline_fallback(true)
            .header(auth::AUTH_HEADER, &auth::token_header_value(token))
            .args(json!({"where": {"is_active": {"_eq": true}}}))
            .fields(Fields::map().with("email").with("id").with("date_created"));

        let res: CallOutput<User> = self.api.call(&input).await;
        if res.meta.has_error {
            log::warn!(
                "User lookup failed ({}): {}",
                res.meta.status_code,
                res.error_message().unwrap_or("unknown error")
            );
            return UserState::Anonymous;
        }
        match res.data {
            Some(user) => {
                log::info!("Session restored ({:?})", res.meta.network);
                UserState::Authenticated(user)
            }
            None => {
                log::warn!("User lookup succeeded without a user record");
                UserState::Anonymous
            }
        }
    }

    async fn authenticate(&self, intent: &str, email: &str, password: &str) -> CallOutput<AuthPayload> {
        let input = CallInput::new(intent)
            .args(Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .fields(
                Fields::map()
                    .nested("user", Fields::map().with("email").with("id"))
                    .with("token"),
            );

        let result: CallOutput<AuthPayload> = self.api.call(&input).await;

        let token = result
            .data
            .as_ref()
            .and_then(|payload| payload.token.as_deref())
            .filter(|token| !token.is_empty());
        match token {
            Some(token) if !result.meta.has_error => {
                if let Err(e) = auth::store_auth_token(self.storage.as_ref(), token) {
                    log::error!("Failed to store auth token after {}: {}", intent, e);
                } else {
                    log::info!("{} succeeded, token stored", intent);
                }
            }
            _ => log::info!("{} did not yield a token", intent),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Network;
    use crate::config::ClientConfig;
    use crate::storage::{MemoryStorage, TOKEN_KEY};
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(endpoint: &str, storage: Arc<MemoryStorage>) -> Session {
        let api = UqlClient::new(&ClientConfig::new(endpoint), storage.clone());
        Session::new(api, storage)
    }

    fn envelope(data: serde_json::Value) -> serde_json::Value {
        json!({
            "meta": {"has_error": false, "status_code": 200},
            "data": data,
            "error": null,
            "warning": null
        })
    }

    fn failure(code: i64, message: &str) -> serde_json::Value {
        json!({
            "meta": {"has_error": true, "status_code": code},
            "data": null,
            "error": {"code": code, "type": "ERR_UNSPECIFIED", "message": message},
            "warning": null
        })
    }

    #[test]
    fn test_user_state_helpers() {
        let user = User {
            email: Some("a@b.co".to_string()),
            ..Default::default()
        };
        assert_eq!(UserState::Unchecked.label(), "Unchecked");
        assert_eq!(UserState::Anonymous.label(), "Anonymous");
        assert!(UserState::Authenticated(user.clone()).is_authenticated());
        assert!(!UserState::Anonymous.is_authenticated());
        assert_eq!(UserState::Authenticated(user.clone()).user(), Some(&user));
        assert_ne!(UserState::Unchecked, UserState::Anonymous);
    }

    #[tokio::test]
    async fn test_signup_stores_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "intent": "functions.signup",
                "args": {"email": "ada@example.com", "password": "hunter22"},
                "fields": {"user": {"email": true, "id": true}, "token": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "user": {"email": "ada@example.com", "id": "u-1"},
                "token": "tok-1"
            }))))
            .expect(1)
            .mount(&server)
            .await;
        let storage = Arc::new(MemoryStorage::new());
        let session = session(&server.uri(), storage.clone());

        let out = session.signup("ada@example.com", "hunter22").await;

        assert!(out.is_ok());
        assert_eq!(out.data.unwrap().user.unwrap().id.as_deref(), Some("u-1"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("tok-1"));
        assert_eq!(session.token().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_signup_error_leaves_token_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(failure(400, "invalid email")))
            .mount(&server)
            .await;
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "old-token").unwrap();
        let session = session(&server.uri(), storage.clone());

        let out = session.signup("nope", "hunter22").await;

        assert!(out.meta.has_error);
        assert_eq!(out.error_message(), Some("invalid email"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("old-token"));
    }

    #[tokio::test]
    async fn test_signup_success_with_empty_token_is_not_stored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "user": {"email": "ada@example.com"},
                "token": ""
            }))))
            .mount(&server)
            .await;
        let storage = Arc::new(MemoryStorage::new());
        let session = session(&server.uri(), storage.clone());

        let out = session.signup("ada@example.com", "hunter22").await;

        assert!(out.is_ok());
        assert!(storage.get(TOKEN_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_signup_network_failure_leaves_token_untouched() {
        let storage = Arc::new(MemoryStorage::new());
        let session = session("http://127.0.0.1:1/", storage.clone());

        let out = session.signup("ada@example.com", "hunter22").await;

        assert!(out.meta.has_error);
        assert_eq!(out.meta.status_code, -1);
        assert!(storage.get(TOKEN_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_uses_login_intent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"intent": "functions.login"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "user": {"email": "ada@example.com", "id": "u-1"},
                "token": "tok-login"
            }))))
            .expect(1)
            .mount(&server)
            .await;
        let storage = Arc::new(MemoryStorage::new());
        let session = session(&server.uri(), storage.clone());

        let out = session.login("ada@example.com", "hunter22").await;

        assert!(out.is_ok());
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("tok-login"));
    }

    #[tokio::test]
    async fn test_bootstrap_without_token_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({}))))
            .expect(0)
            .mount(&server)
            .await;
        let session = session(&server.uri(), Arc::new(MemoryStorage::new()));

        assert_eq!(session.user().await, UserState::Unchecked);
        assert_eq!(session.bootstrap().await, UserState::Anonymous);
        assert_eq!(session.user().await, UserState::Anonymous);
    }

    #[tokio::test]
    async fn test_bootstrap_with_token_authenticates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Token tok-1"))
            .and(body_partial_json(json!({
                "intent": "models.user.find",
                "args": {"where": {"is_active": {"_eq": true}}},
                "fields": {"email": true, "id": true, "date_created": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "email": "ada@example.com",
                "id": "u-1",
                "date_created": "2024-01-01T00:00:00Z"
            }))))
            .expect(1)
            .mount(&server)
            .await;
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "tok-1").unwrap();
        let session = session(&server.uri(), storage.clone());

        let state = session.bootstrap().await;

        let user = state.user().unwrap();
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert_eq!(user.date_created.as_deref(), Some("2024-01-01T00:00:00Z"));
        // the lookup is cached for offline restarts
        assert!(session
            .api()
            .cache()
            .read::<User>(AUTH_USER_CACHE_ID)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_server_error_is_anonymous() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(failure(401, "bad token")))
            .mount(&server)
            .await;
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "tok-1").unwrap();
        let session = session(&server.uri(), storage);

        assert_eq!(session.bootstrap().await, UserState::Anonymous);
    }

    #[tokio::test]
    async fn test_bootstrap_offline_restores_cached_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
                "email": "ada@example.com",
                "id": "u-1"
            }))))
            .mount(&server)
            .await;
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "tok-1").unwrap();

        let online_state = session(&server.uri(), storage.clone()).bootstrap().await;

        let offline = session("http://127.0.0.1:1/", storage);
        let offline_state = offline.bootstrap().await;
        assert_eq!(online_state, offline_state);

        let cached: CallOutput<User> = offline
            .api()
            .call(
                &CallInput::<serde_json::Value>::new("models.user.find")
                    .id(AUTH_USER_CACHE_ID)
                    .offline_fallback(true),
            )
            .await;
        assert_eq!(cached.meta.network, Network::Offline);
    }

    #[tokio::test]
    async fn test_bootstrap_offline_without_cache_is_anonymous() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "tok-1").unwrap();
        let session = session("http://127.0.0.1:1/", storage);

        assert_eq!(session.bootstrap().await, UserState::Anonymous);
    }

    #[tokio::test]
    async fn test_logout_clears_token() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "tok-1").unwrap();
        let session = session("http://127.0.0.1:1/", storage.clone());

        session.logout().await.unwrap();

        assert!(storage.get(TOKEN_KEY).unwrap().is_none());
        assert_eq!(session.user().await, UserState::Anonymous);
        assert!(session.token().is_none());
    }
}

//! Call dispatcher for the UQL endpoint.
//!
//! Every call is one POST to the configured root URL. The dispatcher never
//! returns an error: transport failures become a `"Network error"` envelope,
//! or a cached snapshot when the caller asked for offline fallback.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{multipart, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::types::{Attachment, CallError, CallInput, CallOutput, Network, RequestBody};
use crate::cache::ResponseCache;
use crate::config::ClientConfig;
use crate::storage::Storage;

/// Multipart field that carries the JSON-encoded `{intent, args, fields}`.
pub const REQUEST_BODY_FIELD: &str = "$uql.request.body";

/// Intents that are safe to answer from the offline cache.
static READ_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^models\.[^.]+\.(find|selectmany)$").expect("read intent pattern is valid")
});

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to encode request body: {0}")]
    Encode(serde_json::Error),
    #[error("Failed to parse response ({status}): {source}")]
    Decode {
        status: u16,
        source: serde_json::Error,
    },
    #[error("Invalid header {0:?}")]
    InvalidHeader(String),
    #[error("Invalid attachment {field:?}: {reason}")]
    Attachment { field: String, reason: String },
}

/// HTTP client for the UQL endpoint, backed by a response cache.
///
/// Cheap to clone: the underlying `reqwest::Client` and cache storage are
/// reference counted.
#[derive(Clone)]
pub struct UqlClient {
    client: Client,
    endpoint: String,
    cache: ResponseCache,
}

impl UqlClient {
    /// Create a client for `config.endpoint` caching into `storage`.
    pub fn new(config: &ClientConfig, storage: Arc<dyn Storage>) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: config.endpoint.clone(),
            cache: ResponseCache::new(storage),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Dispatch one call and normalize the result into an envelope.
    pub async fn call<A, T>(&self, input: &CallInput<A>) -> CallOutput<T>
    where
        A: Serialize,
        T: DeserializeOwned + Serialize,
    {
        for warning in offline_fallback_warnings(input) {
            log::warn!("{}", warning);
        }

        if input.intent.trim().is_empty() {
            return CallOutput::failure(
                400,
                CallError {
                    code: Some(400),
                    kind: Some("NO_INTENT".to_string()),
                    message: Some("intent not provided".to_string()),
                },
            );
        }

        match self.send::<A, T>(input).await {
            Ok(mut output) => {
                output.meta.network = Network::Online;
                if output.is_ok() {
                    if let Some(id) = input.cache_id() {
                        if let Err(e) = self.cache.write(id, Some(&output)) {
                            log::warn!("Failed to cache result of {} as {:?}: {}", input.intent, id, e);
                        }
                    }
                }
                output
            }
            Err(e) => {
                log::warn!("Call {} failed: {}", input.intent, e);
                if input.use_offline_fallback {
                    if let Some(cached) = self.cached::<A, T>(input) {
                        return cached;
                    }
                }
                CallOutput::network_error(e.to_string())
            }
        }
    }

    /// Look up the offline snapshot for `input`, stamped as offline.
    fn cached<A, T: DeserializeOwned>(&self, input: &CallInput<A>) -> Option<CallOutput<T>> {
        let id = input.cache_id()?;
        match self.cache.read::<T>(id) {
            Ok(Some(mut cached)) => {
                log::info!("Serving {} from offline cache ({:?})", input.intent, id);
                cached.meta.network = Network::Offline;
                Some(cached)
            }
            Ok(None) => {
                log::info!("No offline snapshot for {:?}", id);
                None
            }
            Err(e) => {
                log::warn!("Offline cache unusable for {:?}: {}", id, e);
                None
            }
        }
    }

    async fn send<A, T>(&self, input: &CallInput<A>) -> Result<CallOutput<T>, TransportError>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        let body =
            serde_json::to_string(&RequestBody::from(input)).map_err(TransportError::Encode)?;
        let mut headers = build_headers(&input.headers)?;

        let builder = self.client.post(&self.endpoint);
        let builder = if input.attachments.is_empty() {
            builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .headers(headers)
                .body(body)
        } else {
            // reqwest sets the multipart content type with its boundary
            if headers.remove(CONTENT_TYPE).is_some() {
                log::debug!("Ignoring caller Content-Type on multipart call");
            }
            builder
                .headers(headers)
                .multipart(build_form(body, &input.attachments)?)
        };

        log::debug!("POST {} intent={}", self.endpoint, input.intent);
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;

        // Server-side failures still carry a JSON envelope, so the HTTP
        // status is not checked here.
        serde_json::from_slice(&bytes).map_err(|source| TransportError::Decode { status, source })
    }
}

/// Convert caller headers into a `HeaderMap`.
fn build_headers(
    headers: &std::collections::HashMap<String, String>,
) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn build_form(body: String, attachments: &[Attachment]) -> Result<multipart::Form, TransportError> {
    let mut form = multipart::Form::new().text(REQUEST_BODY_FIELD, body);
    for attachment in attachments {
        let mut part =
            multipart::Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone());
        if let Some(ref mime) = attachment.mime {
            part = part.mime_str(mime).map_err(|e| TransportError::Attachment {
                field: attachment.field.clone(),
                reason: e.to_string(),
            })?;
        }
        form = form.part(attachment.field.clone(), part);
    }
    Ok(form)
}

/// Developer diagnostics for offline-fallback misuse. Never blocks a call.
pub fn offline_fallback_warnings<A>(input: &CallInput<A>) -> Vec<String> {
    let mut warnings = Vec::new();
    if !input.use_offline_fallback {
        return warnings;
    }
    if input.cache_id().is_none() {
        warnings.push(format!(
            "Offline fallback requested for {} without an id; nothing can be cached",
            input.intent
        ));
    }
    if !READ_INTENT.is_match(&input.intent) {
        warnings.push(format!(
            "Offline fallback should only be used with models.<name>.find or \
             models.<name>.selectmany, got {}",
            input.intent
        ));
    }
    warnings
}

//! Request and response types for the UQL endpoint.
//!
//! Field names are snake_case on the wire, matching the server's envelope.

use std::collections::{BTreeMap, HashMap};

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire marker for "select every field".
pub const ALL_FIELDS: &str = "$all";

/// Error type reported for transport failures.
pub const NETWORK_ERROR_TYPE: &str = "Network error";

/// Status code stamped on envelopes synthesized for transport failures.
pub const NETWORK_ERROR_STATUS: i64 = -1;

// ── Field selection ──────────────────────────────────────────────────────────

/// Which fields of the result payload the caller wants populated.
///
/// Serialized as `"$all"` or as a nested object whose leaves are `true`.
#[derive(Debug, Clone, PartialEq)]
pub enum Fields {
    All,
    Map(BTreeMap<String, FieldSelection>),
}

/// One entry of a [`Fields::Map`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSelection {
    Include,
    Nested(Fields),
}

impl Fields {
    /// Start an empty field map.
    pub fn map() -> Self {
        Fields::Map(BTreeMap::new())
    }

    /// Add a leaf field. Turns `All` into a map.
    pub fn with(self, name: &str) -> Self {
        self.insert(name, FieldSelection::Include)
    }

    /// Add a nested selection.
    pub fn nested(self, name: &str, fields: Fields) -> Self {
        self.insert(name, FieldSelection::Nested(fields))
    }

    fn insert(self, name: &str, selection: FieldSelection) -> Self {
        let mut map = match self {
            Fields::All => BTreeMap::new(),
            Fields::Map(map) => map,
        };
        map.insert(name.to_string(), selection);
        Fields::Map(map)
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Fields::All => serializer.serialize_str(ALL_FIELDS),
            Fields::Map(map) => map.serialize(serializer),
        }
    }
}

impl Serialize for FieldSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldSelection::Include => serializer.serialize_bool(true),
            FieldSelection::Nested(fields) => fields.serialize(serializer),
        }
    }
}

impl TryFrom<Value> for Fields {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) if s == ALL_FIELDS => Ok(Fields::All),
            Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (name, v) in obj {
                    let selection = match v {
                        Value::Bool(true) => FieldSelection::Include,
                        Value::Bool(false) => continue,
                        nested => FieldSelection::Nested(Fields::try_from(nested)?),
                    };
                    map.insert(name, selection);
                }
                Ok(Fields::Map(map))
            }
            other => Err(format!("invalid field selection: {}", other)),
        }
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Fields::try_from(value).map_err(de::Error::custom)
    }
}

// ── Call input ───────────────────────────────────────────────────────────────

/// A file part sent alongside a call. Any attachment switches the request to
/// a multipart body.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

/// Typed description of one dispatcher call.
#[derive(Debug, Clone)]
pub struct CallInput<A = Value> {
    /// Cache key. Successful calls with an id are stored for offline replay.
    pub id: Option<String>,
    /// Dot-separated operation name, e.g. `models.user.find`.
    pub intent: String,
    pub args: Option<A>,
    pub fields: Option<Fields>,
    pub headers: HashMap<String, String>,
    pub use_offline_fallback: bool,
    pub attachments: Vec<Attachment>,
}

impl<A> CallInput<A> {
    pub fn new(intent: &str) -> Self {
        Self {
            id: None,
            intent: intent.to_string(),
            args: None,
            fields: None,
            headers: HashMap::new(),
            use_offline_fallback: false,
            attachments: Vec::new(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn args(mut self, args: A) -> Self {
        self.args = Some(args);
        self
    }

    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn offline_fallback(mut self, enabled: bool) -> Self {
        self.use_offline_fallback = enabled;
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// The cache id, if one was given and is non-empty.
    pub fn cache_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// The `{intent, args, fields}` body posted to the endpoint.
#[derive(Debug, Serialize)]
pub struct RequestBody<'a, A> {
    pub intent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<&'a A>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<&'a Fields>,
}

impl<'a, A> From<&'a CallInput<A>> for RequestBody<'a, A> {
    fn from(input: &'a CallInput<A>) -> Self {
        Self {
            intent: &input.intent,
            args: input.args.as_ref(),
            fields: input.fields.as_ref(),
        }
    }
}

// ── Call output ──────────────────────────────────────────────────────────────

/// Where a result came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub has_error: bool,
    pub status_code: i64,
    #[serde(default)]
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Uniform `{meta, data, error, warning}` envelope every call resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutput<T = Value> {
    pub meta: Meta,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<CallError>,
    #[serde(default)]
    pub warning: Option<String>,
}

impl<T> CallOutput<T> {
    /// Envelope for a failure that never produced a server response.
    /// Stamped offline: nothing in it came from the server.
    pub fn network_error(message: impl Into<String>) -> Self {
        let mut out = Self::failure(
            NETWORK_ERROR_STATUS,
            CallError {
                code: Some(NETWORK_ERROR_STATUS),
                kind: Some(NETWORK_ERROR_TYPE.to_string()),
                message: Some(message.into()),
            },
        );
        out.meta.network = Network::Offline;
        out
    }

    pub fn failure(status_code: i64, error: CallError) -> Self {
        Self {
            meta: Meta {
                has_error: true,
                status_code,
                network: Network::Online,
            },
            data: None,
            error: Some(error),
            warning: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        !self.meta.has_error
    }

    /// Error message for display, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.message.as_deref())
    }
}

// ── Domain payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Box<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<String>,
}

/// Payload of `functions.signup` and `functions.login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Arguments of `functions.signup` and `functions.login`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_serialize_all() {
        assert_eq!(serde_json::to_value(Fields::All).unwrap(), json!("$all"));
    }

    #[test]
    fn test_fields_serialize_nested_map() {
        let fields = Fields::map()
            .nested("user", Fields::map().with("email").with("id"))
            .with("token");
        assert_eq!(
            serde_json::to_value(&fields).unwrap(),
            json!({"user": {"email": true, "id": true}, "token": true})
        );
    }

    #[test]
    fn test_fields_from_json() {
        let fields: Fields =
            serde_json::from_value(json!({"email": true, "notes": "$all", "id": false}))
                .unwrap();
        assert_eq!(
            fields,
            Fields::map()
                .with("email")
                .nested("notes", Fields::All)
        );
        assert!(serde_json::from_value::<Fields>(json!(3)).is_err());
    }

    #[test]
    fn test_request_body_omits_absent_parts() {
        let input: CallInput = CallInput::new("models.user.find");
        let body = serde_json::to_value(RequestBody::from(&input)).unwrap();
        assert_eq!(body, json!({"intent": "models.user.find"}));

        let input = CallInput::new("models.user.find")
            .args(json!({"where": {"id": {"_eq": 1}}}))
            .fields(Fields::All);
        let body = serde_json::to_value(RequestBody::from(&input)).unwrap();
        assert_eq!(
            body,
            json!({
                "intent": "models.user.find",
                "args": {"where": {"id": {"_eq": 1}}},
                "fields": "$all"
            })
        );
    }

    #[test]
    fn test_output_network_defaults_to_online() {
        let out: CallOutput = serde_json::from_value(json!({
            "meta": {"has_error": false, "status_code": 200},
            "data": {"id": "1"},
            "error": null,
            "warning": null
        }))
        .unwrap();
        assert_eq!(out.meta.network, Network::Online);
        assert!(out.is_ok());
    }

    #[test]
    fn test_output_parses_server_error() {
        let out: CallOutput = serde_json::from_value(json!({
            "meta": {"has_error": true, "status_code": 401},
            "data": null,
            "error": {"code": 401, "type": "PERMISSION_ERROR", "message": "denied"},
            "warning": null
        }))
        .unwrap();
        assert!(!out.is_ok());
        assert_eq!(out.error_message(), Some("denied"));
        assert_eq!(out.error.unwrap().kind.as_deref(), Some("PERMISSION_ERROR"));
    }

    #[test]
    fn test_network_error_envelope() {
        let out: CallOutput<User> = CallOutput::network_error("connection refused");
        assert!(out.meta.has_error);
        assert_eq!(out.meta.status_code, -1);
        assert_eq!(out.meta.network, Network::Offline);
        let err = out.error.unwrap();
        assert_eq!(err.code, Some(-1));
        assert_eq!(err.kind.as_deref(), Some("Network error"));
        assert_eq!(err.message.as_deref(), Some("connection refused"));
        assert!(out.data.is_none());
    }

    #[test]
    fn test_output_with_missing_data_parses_for_non_default_payload() {
        let out: CallOutput<AuthPayload> = serde_json::from_value(json!({
            "meta": {"has_error": true, "status_code": 400}
        }))
        .unwrap();
        assert!(out.data.is_none());
        assert!(out.error.is_none());
    }

    #[test]
    fn test_user_ignores_unknown_fields() {
        let user: User = serde_json::from_value(json!({
            "email": "a@b.co",
            "id": "7",
            "role": "admin"
        }))
        .unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.co"));
        assert!(user.notes.is_none());
    }
}

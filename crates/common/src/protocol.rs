//! Request and response types exchanged with the jambuster backend API.
//!
//! Success bodies are always wrapped in a single-key envelope (`{"user": ...}`,
//! `{"tune": ...}`). Error bodies share one generic shape, `{"error": ...}`,
//! whose payload is either an object keyed by field name or a bare message.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// A user record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub activated: bool,
}

/// Success envelope for the user endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: User,
}

/// Request body for `PUT /v1/users/activate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub token: String,
}

// ---------------------------------------------------------------------------
// Authentication tokens
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/tokens/authentication`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Bearer credential issued by the backend on a successful login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationToken {
    /// Plaintext bearer token, sent as `Authorization: Bearer <token>`.
    pub token: String,
    /// Instant after which the backend no longer accepts the token.
    pub expiry: DateTime<Utc>,
}

impl AuthenticationToken {
    /// Returns `true` while the token is non-empty and has not expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.token.trim().is_empty() && self.expiry > now
    }
}

impl std::fmt::Debug for AuthenticationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationToken")
            .field("token", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Success envelope for `POST /v1/tokens/authentication`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationTokenEnvelope {
    pub authentication_token: AuthenticationToken,
}

// ---------------------------------------------------------------------------
// Tunes
// ---------------------------------------------------------------------------

/// A tune record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tune {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub time_signature: String,
    #[serde(default)]
    pub structure: String,
    #[serde(default)]
    pub has_lyrics: bool,
}

/// Request body for `POST /v1/tunes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTune {
    pub title: String,
    pub styles: Vec<String>,
    pub keys: Vec<String>,
    pub time_signature: String,
    pub structure: String,
    pub has_lyrics: bool,
}

/// Success envelope for the tune endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneEnvelope {
    pub tune: Tune,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned by the backend on any 4xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

/// Payload of an [`ErrorEnvelope`].
///
/// Each endpoint lays out its field keys differently, so the field form is
/// kept as a plain string map rather than a per-endpoint schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    /// `{"error": {"email": "a user with this email address already exists"}}`
    Fields(BTreeMap<String, String>),
    /// `{"error": "the requested resource could not be found"}`
    Message(String),
}

/// A decoded backend rejection, ready to be merged into a form's errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiRejection {
    /// Field-keyed messages. Never contains an empty key.
    pub fields: BTreeMap<String, String>,
    /// Messages not tied to a field.
    pub general: Vec<String>,
}

impl ApiRejection {
    /// Returns the backend's message for `field`, if any.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

impl From<ErrorDetail> for ApiRejection {
    fn from(detail: ErrorDetail) -> Self {
        match detail {
            ErrorDetail::Fields(map) => Self {
                fields: map
                    .into_iter()
                    .filter(|(key, _)| !key.trim().is_empty())
                    .collect(),
                general: Vec::new(),
            },
            ErrorDetail::Message(msg) => Self {
                fields: BTreeMap::new(),
                general: vec![msg],
            },
        }
    }
}

//! Server-side sessions: the store contract, the request-scoped handle, and
//! the middleware that loads and saves them.
//!
//! # Lifecycle
//!
//! 1. [`layer::load_and_save`] resolves the `session` cookie through the
//!    [`SessionStore`] and attaches a [`Session`] to the request.
//! 2. Handlers read and write typed values through the handle. The first
//!    write to a session without a token gives it one.
//! 3. On privilege change handlers call [`Session::renew_token`]; the data is
//!    kept and the old token is retired.
//! 4. After the handler returns, modified sessions are committed, retired
//!    tokens are deleted, and the current token is sent back as a cookie.
//!
//! # Security invariants
//!
//! - A token the store does not know is never adopted; the client gets a
//!   fresh one on the next write.
//! - Session and CSRF tokens are 256 bits from the OS RNG and are never logged.

pub mod layer;
pub mod store;

pub use layer::{SessionConfig, SessionManager};
pub use store::{MemoryStore, SessionStore, StoreError};

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use common::protocol::AuthenticationToken;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::AppError;

/// Number of random bytes behind every session and CSRF token.
const TOKEN_BYTES: usize = 32;

/// Generate a URL-safe random token.
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Values persisted for one session.
///
/// Each key has a typed accessor on [`Session`]; nothing else reads or
/// writes these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authenticated_user_token: Option<AuthenticationToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    csrf_token: Option<String>,
}

#[derive(Debug)]
struct Inner {
    token: Option<String>,
    data: SessionData,
    modified: bool,
    retired: Vec<String>,
}

/// Handle to the current request's session.
///
/// Cloned into request extensions by the session layer; all clones see the
/// same state.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
}

/// What the session layer must persist after the handler returns.
#[derive(Debug)]
pub(crate) struct Commit {
    pub token: String,
    pub data: SessionData,
    pub retired: Vec<String>,
}

impl Session {
    fn with(token: Option<String>, data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                token,
                data,
                modified: false,
                retired: Vec::new(),
            })),
        }
    }

    /// A session with no token and no data.
    pub(crate) fn fresh() -> Self {
        Self::with(None, SessionData::default())
    }

    /// A session loaded from the store under `token`.
    pub(crate) fn resume(token: String, data: SessionData) -> Self {
        Self::with(Some(token), data)
    }

    /// The token currently identifying this session, if it has one yet.
    #[cfg(test)]
    pub async fn token(&self) -> Option<String> {
        self.inner.lock().await.token.clone()
    }

    /// Rotate the session token, keeping all data.
    ///
    /// The previous token is deleted from the store on commit, so a client
    /// still holding it starts over with an empty session.
    pub async fn renew_token(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.token.replace(generate_token()) {
            inner.retired.push(old);
        }
        inner.modified = true;
    }

    /// The stored bearer credential, live or not.
    pub async fn credential(&self) -> Option<AuthenticationToken> {
        self.inner.lock().await.data.authenticated_user_token.clone()
    }

    /// The bearer token to send to the backend, if the credential is live.
    pub async fn bearer(&self) -> Option<String> {
        self.credential()
            .await
            .filter(|cred| cred.is_live(Utc::now()))
            .map(|cred| cred.token)
    }

    /// `true` if the session holds a non-empty, unexpired credential.
    pub async fn is_authenticated(&self) -> bool {
        self.bearer().await.is_some()
    }

    pub async fn put_credential(&self, credential: AuthenticationToken) {
        let mut inner = self.inner.lock().await;
        inner.data.authenticated_user_token = Some(credential);
        inner.modified = true;
    }

    pub async fn remove_credential(&self) {
        let mut inner = self.inner.lock().await;
        inner.data.authenticated_user_token = None;
        inner.modified = true;
    }

    pub async fn put_flash(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.data.flash = Some(message.into());
        inner.modified = true;
    }

    /// Take the flash message, clearing it. A session without one is untouched.
    pub async fn pop_flash(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let flash = inner.data.flash.take();
        if flash.is_some() {
            inner.modified = true;
        }
        flash
    }

    /// The anti-forgery token bound to this session, created on first use.
    pub async fn csrf_token(&self) -> String {
        let mut inner = self.inner.lock().await;
        if let Some(token) = &inner.data.csrf_token {
            return token.clone();
        }
        let token = generate_token();
        inner.data.csrf_token = Some(token.clone());
        inner.modified = true;
        token
    }

    /// The anti-forgery token bound to this session, without creating one.
    pub async fn existing_csrf_token(&self) -> Option<String> {
        self.inner.lock().await.data.csrf_token.clone()
    }

    /// Drain pending changes. Returns `None` if nothing needs persisting.
    pub(crate) async fn take_commit(&self) -> Option<Commit> {
        let mut inner = self.inner.lock().await;
        if !inner.modified {
            return None;
        }
        inner.modified = false;
        let token = inner.token.get_or_insert_with(generate_token).clone();
        Some(Commit {
            token,
            data: inner.data.clone(),
            retired: std::mem::take(&mut inner.retired),
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AppError::Internal("session layer is not installed"))
    }
}

//! Session load/save middleware and the manager it runs on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{
        header::{COOKIE, SET_COOKIE, VARY},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{error, warn};

use super::store::{SessionStore, StoreError};
use super::{Session, SessionData};
use crate::error::AppError;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Session lifetime and cookie settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a committed session stays in the store.
    pub lifetime: Duration,
    /// Whether the cookie is marked `Secure`.
    pub cookie_secure: bool,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(12 * 60 * 60),
            cookie_secure: true,
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// Loads sessions at the start of a request and persists them at the end.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    /// Resolve `token` to a session.
    ///
    /// Unknown, expired or undecodable tokens yield a fresh session; only
    /// store failures are errors.
    pub async fn load(&self, token: Option<&str>) -> Result<Session, StoreError> {
        let Some(token) = token else {
            return Ok(Session::fresh());
        };
        let Some(bytes) = self.bounded(self.store.find(token)).await? else {
            return Ok(Session::fresh());
        };
        match serde_json::from_slice::<SessionData>(&bytes) {
            Ok(data) => Ok(Session::resume(token.to_owned(), data)),
            Err(e) => {
                warn!(error = %e, "discarding undecodable session data");
                Ok(Session::fresh())
            }
        }
    }

    /// Persist pending changes and return the `Set-Cookie` value to send, if
    /// anything was written.
    pub async fn commit(&self, session: &Session) -> Result<Option<String>, StoreError> {
        let Some(commit) = session.take_commit().await else {
            return Ok(None);
        };

        for token in &commit.retired {
            self.bounded(self.store.delete(token)).await?;
        }

        let bytes =
            serde_json::to_vec(&commit.data).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let ttl = chrono::Duration::from_std(self.config.lifetime)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        self.bounded(self.store.commit(&commit.token, &bytes, Utc::now() + ttl))
            .await?;

        Ok(Some(self.cookie(&commit.token)))
    }

    fn cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.config.lifetime.as_secs()
        );
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.config.store_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.config.store_timeout))?
    }
}

/// Extract the session token from the request's `Cookie` headers.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

/// Middleware: attach the request's [`Session`], run the rest of the chain,
/// then commit whatever the chain changed.
pub async fn load_and_save(
    State(manager): State<SessionManager>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = session_cookie(req.headers());
    let session = match manager.load(token.as_deref()).await {
        Ok(session) => session,
        Err(e) => return AppError::from(e).into_response(),
    };
    req.extensions_mut().insert(session.clone());

    let mut resp = next.run(req).await;

    match manager.commit(&session).await {
        Ok(Some(cookie)) => match HeaderValue::try_from(cookie) {
            Ok(value) => {
                let headers = resp.headers_mut();
                headers.append(SET_COOKIE, value);
                headers.append(VARY, HeaderValue::from_static("Cookie"));
                resp
            }
            Err(e) => {
                error!(error = %e, "session cookie is not a valid header value");
                AppError::Internal("invalid session cookie").into_response()
            }
        },
        Ok(None) => resp,
        Err(e) => AppError::from(e).into_response(),
    }
}

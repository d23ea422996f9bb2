//! Test harness shared by the server tests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        Method, Request,
    },
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use common::protocol::AuthenticationToken;
use tower::ServiceExt;

use super::{router, state::AppState};
use crate::api::backend::{Backend, MockBackend};
use crate::session::{MemoryStore, Session, SessionConfig, SessionManager, SessionStore};

pub const BEARER: &str = "Y3ATVYKG5SZBHVKIJOYP5B4WPE";

pub fn test_sessions() -> (SessionManager, MemoryStore) {
    let store = MemoryStore::new();
    let sessions = SessionManager::new(
        Arc::new(store.clone()),
        SessionConfig {
            cookie_secure: false,
            ..SessionConfig::default()
        },
    );
    (sessions, store)
}

pub fn live_credential() -> AuthenticationToken {
    AuthenticationToken {
        token: BEARER.into(),
        expiry: Utc::now() + Duration::hours(1),
    }
}

/// A session already in the store, as a returning browser would present it.
pub struct Seeded {
    pub token: String,
    pub csrf: String,
}

pub async fn seed_session(sessions: &SessionManager, authenticated: bool) -> Seeded {
    let session = sessions.load(None).await.unwrap();
    let csrf = session.csrf_token().await;
    if authenticated {
        session.put_credential(live_credential()).await;
    }
    sessions.commit(&session).await.unwrap();
    Seeded {
        token: session.token().await.unwrap(),
        csrf,
    }
}

pub async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The session token a response hands back, if it set one.
pub fn issued_token(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}

/// The full application wired to a mock backend and an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub sessions: SessionManager,
    pub store: MemoryStore,
}

impl TestApp {
    pub fn new(backend: MockBackend) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Wire the app to any backend, such as a real client aimed at a stub.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        let (sessions, store) = test_sessions();
        let state = AppState::new(backend, sessions.clone());
        Self {
            router: router::build(state),
            sessions,
            store,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn get(&self, uri: &str, seeded: Option<&Seeded>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(seeded) = seeded {
            builder = builder.header(COOKIE, format!("session={}", seeded.token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// POST a urlencoded form, appending the seeded session's CSRF token.
    pub async fn post_form(&self, uri: &str, seeded: &Seeded, fields: &str) -> Response {
        let body = if fields.is_empty() {
            format!("csrf_token={}", seeded.csrf)
        } else {
            format!("{fields}&csrf_token={}", seeded.csrf)
        };
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(COOKIE, format!("session={}", seeded.token))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    /// Raw stored bytes for `token`.
    pub async fn stored(&self, token: &str) -> Option<Vec<u8>> {
        self.store.find(token).await.unwrap()
    }

    /// Load the session stored under `token`.
    pub async fn session(&self, token: &str) -> Session {
        self.sessions.load(Some(token)).await.unwrap()
    }
}

//! HTTP client for the backend API and the status → outcome mapping.

use std::sync::Arc;
use std::time::Duration;

use common::protocol::{ApiRejection, ErrorEnvelope};
use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Failures talking to the backend that the front end cannot recover from.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connecting, writing, or reading failed at the network level.
    #[error("backend request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The full round trip did not finish within the configured duration.
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    /// The response body did not have the expected shape.
    #[error("backend response could not be decoded: {0}")]
    Decode(String),

    /// The backend answered with a status outside the documented contract.
    #[error("backend responded with unexpected status {0}")]
    UnexpectedStatus(StatusCode),
}

/// Result of a single backend call. Exactly one variant applies.
#[derive(Debug)]
pub enum ApiOutcome<T> {
    /// 2xx with a body decoded into the caller's type.
    Success(T),
    /// 4xx, or a 2xx other than the one the endpoint promises. Bodies that
    /// are not an error envelope give a rejection with no details.
    ClientRejected(ApiRejection),
    /// 401, whatever the body says.
    Unauthorized,
    /// Network failure, timeout, malformed body, or an unexpected status.
    TransportFailure(ApiError),
}

impl<T> ApiOutcome<T> {
    /// Transform the success payload, leaving every other outcome unchanged.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiOutcome<U> {
        match self {
            ApiOutcome::Success(v) => ApiOutcome::Success(f(v)),
            ApiOutcome::ClientRejected(r) => ApiOutcome::ClientRejected(r),
            ApiOutcome::Unauthorized => ApiOutcome::Unauthorized,
            ApiOutcome::TransportFailure(e) => ApiOutcome::TransportFailure(e),
        }
    }
}

/// Connection-pooled client bound to one backend base address.
///
/// Cheap to clone; clones share the underlying pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client for `base_url` whose calls are abandoned after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Request`] if the TLS backend cannot be initialised.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Request)?;
        Ok(Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            timeout,
        })
    }

    /// Join `path` onto the configured base address.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Issue one request and translate the response.
    ///
    /// `bearer` is attached as `Authorization: Bearer <token>` when present;
    /// a missing token is left for the backend to reject.
    pub async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        bearer: Option<&str>,
    ) -> ApiOutcome<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(method, path, body, bearer, None).await
    }

    /// Like [`ApiClient::call`], but only `expected` counts as success; any
    /// other 2xx is a rejection with no details.
    pub async fn call_expecting<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        bearer: Option<&str>,
        expected: StatusCode,
    ) -> ApiOutcome<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(method, path, body, bearer, Some(expected)).await
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        bearer: Option<&str>,
        expected: Option<StatusCode>,
    ) -> ApiOutcome<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .header(header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return ApiOutcome::TransportFailure(self.classify(e)),
        };

        let status = resp.status();
        debug!(%method, path, status = status.as_u16(), "backend responded");
        if status == StatusCode::UNAUTHORIZED {
            return ApiOutcome::Unauthorized;
        }

        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return ApiOutcome::TransportFailure(self.classify(e)),
        };
        decode_outcome(status, &bytes, expected)
    }

    fn classify(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Request(err)
        }
    }
}

/// Map a non-401 status and its body onto an [`ApiOutcome`].
///
/// A 4xx is always a rejection: bodies that are not the error envelope yield
/// one with no details.
fn decode_outcome<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
    expected: Option<StatusCode>,
) -> ApiOutcome<T> {
    if status.is_success() {
        if expected.is_some_and(|expected| expected != status) {
            warn!(status = status.as_u16(), "backend answered with an unexpected success status");
            return ApiOutcome::ClientRejected(ApiRejection::default());
        }
        return match serde_json::from_slice(body) {
            Ok(v) => ApiOutcome::Success(v),
            Err(e) => ApiOutcome::TransportFailure(ApiError::Decode(e.to_string())),
        };
    }

    if status.is_client_error() {
        return match serde_json::from_slice::<ErrorEnvelope>(body) {
            Ok(env) => ApiOutcome::ClientRejected(env.error.into()),
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "backend error body is not an error envelope");
                ApiOutcome::ClientRejected(ApiRejection::default())
            }
        };
    }

    ApiOutcome::TransportFailure(ApiError::UnexpectedStatus(status))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        http::HeaderMap,
        routing::{get, post},
        Json, Router,
    };
    use common::protocol::{TuneEnvelope, UserEnvelope};
    use serde_json::json;
    use std::time::Instant;

    /// Serve `router` on an ephemeral loopback port and return its base URL.
    pub(crate) async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn url_joins_base_and_path() {
        let c = ApiClient::new("http://backend:4000/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.url("/v1/users"), "http://backend:4000/v1/users");
        assert_eq!(c.url("v1/users"), "http://backend:4000/v1/users");
    }

    #[tokio::test]
    async fn success_decodes_payload() {
        let stub = Router::new().route(
            "/v1/users",
            post(|| async {
                (
                    axum::http::StatusCode::CREATED,
                    Json(json!({"user": {"id": 1, "name": "Alice", "email": "alice@example.com", "activated": false}})),
                )
            }),
        );
        let base = spawn_stub(stub).await;
        let out: ApiOutcome<UserEnvelope> = client(&base)
            .call(Method::POST, "/v1/users", Some(&json!({"name": "Alice"})), None)
            .await;
        match out {
            ApiOutcome::Success(env) => assert_eq!(env.user.email, "alice@example.com"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn field_errors_become_client_rejected() {
        let stub = Router::new().route(
            "/v1/users",
            post(|| async {
                (
                    axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"error": {"email": "a user with this email address already exists"}})),
                )
            }),
        );
        let base = spawn_stub(stub).await;
        let out: ApiOutcome<UserEnvelope> = client(&base)
            .call(Method::POST, "/v1/users", Some(&json!({})), None)
            .await;
        match out {
            ApiOutcome::ClientRejected(r) => assert_eq!(
                r.field("email"),
                Some("a user with this email address already exists")
            ),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_ignores_body() {
        let stub = Router::new().route(
            "/v1/tunes/1",
            get(|| async { (axum::http::StatusCode::UNAUTHORIZED, "definitely not json") }),
        );
        let base = spawn_stub(stub).await;
        let out: ApiOutcome<TuneEnvelope> = client(&base)
            .call::<(), _>(Method::GET, "/v1/tunes/1", None, Some("stale"))
            .await;
        assert!(matches!(out, ApiOutcome::Unauthorized));
    }

    #[tokio::test]
    async fn server_error_is_transport_failure() {
        let stub = Router::new().route(
            "/v1/users",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))) }),
        );
        let base = spawn_stub(stub).await;
        let out: ApiOutcome<UserEnvelope> = client(&base)
            .call(Method::POST, "/v1/users", Some(&json!({})), None)
            .await;
        assert!(matches!(
            out,
            ApiOutcome::TransportFailure(ApiError::UnexpectedStatus(s)) if s == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn malformed_success_body_is_transport_failure() {
        let stub = Router::new().route("/v1/tunes/2", get(|| async { "<html>not json</html>" }));
        let base = spawn_stub(stub).await;
        let out: ApiOutcome<TuneEnvelope> = client(&base)
            .call::<(), _>(Method::GET, "/v1/tunes/2", None, None)
            .await;
        assert!(matches!(out, ApiOutcome::TransportFailure(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn bearer_header_is_attached() {
        let stub = Router::new().route(
            "/v1/tunes/3",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                Json(json!({"tune": {"id": 3, "title": auth}}))
            }),
        );
        let base = spawn_stub(stub).await;
        let out: ApiOutcome<TuneEnvelope> = client(&base)
            .call::<(), _>(Method::GET, "/v1/tunes/3", None, Some("TOKEN26CHARSXXXXXXXXXXXXXX"))
            .await;
        match out {
            ApiOutcome::Success(env) => assert_eq!(env.tune.title, "Bearer TOKEN26CHARSXXXXXXXXXXXXXX"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let stub = Router::new().route(
            "/v1/tunes/4",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Json(json!({"tune": {"id": 4, "title": "too late"}}))
            }),
        );
        let base = spawn_stub(stub).await;
        let c = ApiClient::new(&base, Duration::from_millis(200)).unwrap();

        let started = Instant::now();
        let out: ApiOutcome<TuneEnvelope> = c.call::<(), _>(Method::GET, "/v1/tunes/4", None, None).await;
        assert!(matches!(out, ApiOutcome::TransportFailure(ApiError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn refused_connection_is_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let out: ApiOutcome<TuneEnvelope> = client(&format!("http://{addr}"))
            .call::<(), _>(Method::GET, "/v1/tunes/5", None, None)
            .await;
        assert!(matches!(out, ApiOutcome::TransportFailure(ApiError::Request(_))));
    }

    #[test]
    fn non_envelope_client_error_is_an_empty_rejection() {
        let out: ApiOutcome<TuneEnvelope> =
            decode_outcome(StatusCode::BAD_REQUEST, b"Bad Request", None);
        match out {
            ApiOutcome::ClientRejected(r) => assert_eq!(r, ApiRejection::default()),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn other_success_status_than_expected_is_rejected() {
        let body = br#"{"tune": {"id": 1, "title": "x"}}"#;
        let accepted: ApiOutcome<TuneEnvelope> =
            decode_outcome(StatusCode::OK, body, Some(StatusCode::OK));
        assert!(matches!(accepted, ApiOutcome::Success(_)));

        let refused: ApiOutcome<TuneEnvelope> =
            decode_outcome(StatusCode::ACCEPTED, body, Some(StatusCode::OK));
        assert!(matches!(refused, ApiOutcome::ClientRejected(_)));
    }

    #[test]
    fn not_found_message_is_client_rejected() {
        let out: ApiOutcome<TuneEnvelope> = decode_outcome(
            StatusCode::NOT_FOUND,
            br#"{"error":"the requested resource could not be found"}"#,
            None,
        );
        match out {
            ApiOutcome::ClientRejected(r) => assert_eq!(r.general.len(), 1),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}

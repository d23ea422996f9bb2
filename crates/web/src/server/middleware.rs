//! Axum middleware layers applied to the router.
//!
//! Two stacks wrap the routes, listed outermost first:
//!
//! - **standard** (every request): panic recovery, request logging,
//!   security headers, compression, request timeout.
//! - **dynamic** (page routes): session load/save, CSRF verification.
//!
//! Protected routes additionally carry [`require_authentication`] as a route
//! layer, so it only runs for matched routes.

use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, FromRequest, Request},
    http::{
        header::{
            CACHE_CONTROL, CONNECTION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, REFERRER_POLICY,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
        },
        HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Redirect, Response},
    Form, Router,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn, Span};

use crate::error::{status_page, AppError};
use crate::session::{layer::load_and_save, Session, SessionManager};

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Form field carrying the anti-forgery token.
pub const CSRF_FORM_FIELD: &str = "csrf_token";

/// Header carrying the anti-forgery token for non-form clients.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Where unauthenticated page views are sent.
pub const LOGIN_PATH: &str = "/user/login";

/// Largest request body the CSRF check will buffer.
const MAX_FORM_BYTES: usize = 64 * 1024;

const CSP: &str = "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";
const PERMISSIONS_POLICY: &str =
    "camera=(), microphone=(), geolocation=(), payment=(), usb=(), interest-cohort=()";

/// Wrap `router` in the layers every request passes through.
pub fn standard<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(recover))
            .layer(TraceLayer::new_for_http().on_request(log_request))
            .layer(from_fn(secure_headers))
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
    )
}

/// Wrap `router` in the session and CSRF layers used by page routes.
pub fn dynamic<S>(router: Router<S>, sessions: SessionManager) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(from_fn_with_state(sessions, load_and_save))
            .layer(from_fn(verify_csrf)),
    )
}

/// Restrict every route in `router` to authenticated sessions.
pub fn protected<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(from_fn(require_authentication))
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

fn recover(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };
    error!(panic = detail, "request handler panicked");

    let mut resp = status_page(StatusCode::INTERNAL_SERVER_ERROR);
    resp.headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    resp
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn log_request(req: &Request<Body>, _span: &Span) {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    info!(
        ip = ip.as_deref().unwrap_or("-"),
        proto = ?req.version(),
        method = %req.method(),
        uri = %req.uri(),
        "received request"
    );
}

// ---------------------------------------------------------------------------
// Security headers
// ---------------------------------------------------------------------------

/// Set the fixed security headers on every response, replacing any value a
/// handler set.
pub async fn secure_headers(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("0"));
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(PERMISSIONS_POLICY),
    );
    resp
}

// ---------------------------------------------------------------------------
// CSRF
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CsrfField {
    csrf_token: Option<String>,
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Reject state-changing requests whose token does not match the session's.
///
/// The token is read from [`CSRF_HEADER`], falling back to the
/// [`CSRF_FORM_FIELD`] of a urlencoded body. The body is restored before the
/// handler sees it.
pub async fn verify_csrf(session: Session, req: Request, next: Next) -> Response {
    if !is_state_changing(req.method()) {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let uri = req.uri().clone();
    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return AppError::BadForm(e.to_string()).into_response(),
    };

    let submitted = match parts
        .headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(token) => Some(token.to_owned()),
        None => form_token(parts.headers.get(CONTENT_TYPE), &bytes).await,
    };

    match (submitted, session.existing_csrf_token().await) {
        (Some(submitted), Some(expected)) if tokens_match(&submitted, &expected) => {
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        _ => {
            warn!(%method, %uri, "rejected request with missing or invalid CSRF token");
            status_page(StatusCode::FORBIDDEN)
        }
    }
}

async fn form_token(content_type: Option<&HeaderValue>, bytes: &Bytes) -> Option<String> {
    let probe = Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, content_type?.clone())
        .body(Body::from(bytes.clone()))
        .ok()?;
    let Form(field) = Form::<CsrfField>::from_request(probe, &()).await.ok()?;
    field.csrf_token
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

// ---------------------------------------------------------------------------
// Authentication gate
// ---------------------------------------------------------------------------

/// Let only authenticated sessions through.
///
/// Page views are redirected to the login form; any other method gets a bare
/// 401. Responses that do get through are marked `Cache-Control: no-store`.
pub async fn require_authentication(session: Session, req: Request, next: Next) -> Response {
    if !session.is_authenticated().await {
        return if matches!(*req.method(), Method::GET | Method::HEAD) {
            Redirect::to(LOGIN_PATH).into_response()
        } else {
            status_page(StatusCode::UNAUTHORIZED)
        };
    }
    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp
}

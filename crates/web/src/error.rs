//! Errors that end a request with a generic error page.
//!
//! Validation failures and backend rejections never reach this type; handlers
//! turn them into re-rendered forms. What remains is either the client's fault
//! (malformed body, unknown resource) or ours, and ours is logged in full but
//! shown to the user only as a status line.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::api::ApiError;
use crate::session::StoreError;

/// Request-terminating error.
///
/// Variants map to HTTP status codes returned to the browser:
/// - [`AppError::BadForm`] → 400
/// - [`AppError::NotFound`] → 404
/// - [`AppError::Transport`], [`AppError::SessionStore`], [`AppError::Internal`] → 500
#[derive(Debug, Error)]
pub enum AppError {
    /// The backend could not be reached or answered outside its contract.
    #[error("backend transport failure: {0}")]
    Transport(#[from] ApiError),

    /// The session store failed to load or persist a session.
    #[error("session store failure: {0}")]
    SessionStore(#[from] StoreError),

    /// The submitted form body could not be decoded.
    #[error("malformed form submission: {0}")]
    BadForm(String),

    /// No such page or resource.
    #[error("not found")]
    NotFound,

    /// A wiring invariant did not hold.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl AppError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::BadForm(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Transport(_) | AppError::SessionStore(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        status_page(status)
    }
}

/// Plain-text response carrying only the status line's reason phrase.
pub fn status_page(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reason,
    )
        .into_response()
}

//! Axum HTTP server: routing, middleware, page handlers and rendering.
//!
//! # Responsibilities
//! - Compose the middleware chain around the routes.
//! - Turn form submissions into backend calls and session transitions.
//! - Inject shared application state (`AppState`) into handlers.

pub mod handlers;
pub mod middleware;
pub mod render;
pub mod router;
pub mod state;
pub mod tunes;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

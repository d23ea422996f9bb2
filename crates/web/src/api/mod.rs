//! Client for the jambuster backend JSON API.
//!
//! [`ApiClient`] owns HTTP plumbing: URL building, bearer credentials, the
//! round-trip timeout, and translating status codes into an [`ApiOutcome`].
//! [`Backend`] names the endpoints the front end actually uses and is the
//! seam handlers depend on.

pub mod backend;
pub mod client;

pub use backend::Backend;
pub use client::{ApiClient, ApiError, ApiOutcome};

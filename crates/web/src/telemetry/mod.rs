//! Structured logging for the web front end.
//!
//! # Logging invariants
//!
//! - Passwords, bearer tokens, session tokens and CSRF tokens must never
//!   appear in any log field.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;

pub use init::init_telemetry;

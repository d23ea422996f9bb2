//! Configuration loading and validation for the web front end.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is present but invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use common::validator::permitted_value;
use serde::Deserialize;

/// Deployment environments the service recognises.
const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];

/// Validated web front-end configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Deployment environment (`development`, `staging` or `production`).
    #[serde(default = "default_env")]
    pub env: String,

    /// Base address of the jambuster backend API, e.g. `http://localhost:4000`.
    #[serde(default = "default_backend_hostname")]
    pub backend_hostname: String,

    /// Maximum time (seconds) to wait for a full backend round trip.
    #[serde(default = "default_api_max_request_time")]
    pub api_max_request_time_secs: u64,

    /// How long (seconds) a session lives in the store after its last write.
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_secs: u64,

    /// Maximum time (seconds) to wait for a session store load or save.
    #[serde(default = "default_session_store_timeout")]
    pub session_store_timeout_secs: u64,

    /// Whether the session cookie carries the `Secure` attribute.
    #[serde(default = "default_session_cookie_secure")]
    pub session_cookie_secure: bool,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    4200
}
fn default_env() -> String {
    "development".into()
}
fn default_backend_hostname() -> String {
    "http://localhost:4000".into()
}
fn default_api_max_request_time() -> u64 {
    10
}
fn default_session_lifetime() -> u64 {
    12 * 60 * 60
}
fn default_session_store_timeout() -> u64 {
    5
}
fn default_session_cookie_secure() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            env: default_env(),
            backend_hostname: default_backend_hostname(),
            api_max_request_time_secs: default_api_max_request_time(),
            session_lifetime_secs: default_session_lifetime(),
            session_store_timeout_secs: default_session_store_timeout(),
            session_cookie_secure: default_session_cookie_secure(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    pub fn api_max_request_time(&self) -> Duration {
        Duration::from_secs(self.api_max_request_time_secs)
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_lifetime_secs)
    }

    pub fn session_store_timeout(&self) -> Duration {
        Duration::from_secs(self.session_store_timeout_secs)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if !permitted_value(&self.env.as_str(), ENVIRONMENTS) {
            anyhow::bail!("ENV must be one of {}", ENVIRONMENTS.join("|"));
        }
        let backend = self.backend_hostname.trim();
        if !(backend.starts_with("http://") || backend.starts_with("https://")) {
            anyhow::bail!("BACKEND_HOSTNAME must be an http:// or https:// address");
        }
        if self.api_max_request_time_secs == 0 {
            anyhow::bail!("API_MAX_REQUEST_TIME_SECS must be > 0");
        }
        if self.session_lifetime_secs == 0 {
            anyhow::bail!("SESSION_LIFETIME_SECS must be > 0");
        }
        if self.session_store_timeout_secs == 0 {
            anyhow::bail!("SESSION_STORE_TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }
}

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{HoldbookError, Result};

/// Default backend address.
pub const DEFAULT_API_BASE: &str = "http://localhost:5000";

/// Default previous-record endpoint for 1X2 detail views.
pub const DEFAULT_PREVIOUS_ENDPOINT: &str = "/api/bighold/previous";

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Configuration for the holdbook HTTP adapter.
#[derive(Debug, Clone)]
pub struct HoldbookConfig {
    /// Base URL of the backend API (e.g. `http://localhost:5000`).
    pub api_base: String,
    /// Path of the previous-record endpoint. Line markets (goal line, corner,
    /// asian handicap) are served from their own paths.
    pub previous_endpoint: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for HoldbookConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            previous_endpoint: DEFAULT_PREVIOUS_ENDPOINT.into(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl HoldbookConfig {
    /// Read `HOLDBOOK_API_BASE`, `HOLDBOOK_PREVIOUS_ENDPOINT` and
    /// `HOLDBOOK_TIMEOUT_MS`. Missing or unparsable values keep their
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env::var("HOLDBOOK_API_BASE").unwrap_or(defaults.api_base),
            previous_endpoint: env::var("HOLDBOOK_PREVIOUS_ENDPOINT")
                .unwrap_or(defaults.previous_endpoint),
            request_timeout_ms: env::var("HOLDBOOK_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_ms),
        }
    }

    /// Check that `api_base` is an absolute http(s) URL and the endpoint is a
    /// path.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_base)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HoldbookError::Config(format!(
                "unsupported scheme '{}' in api_base",
                url.scheme()
            )));
        }
        if !self.previous_endpoint.starts_with('/') {
            return Err(HoldbookError::Config(format!(
                "previous_endpoint must start with '/': {}",
                self.previous_endpoint
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

pub mod endpoints;

use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::HoldbookConfig;
use crate::error::{HoldbookError, Result};
use crate::session::SessionContext;

/// HTTP client wrapper for the holdbook backend API.
#[derive(Debug, Clone)]
pub struct HoldbookHttpClient {
    client: Client,
    base_url: String,
    session: Option<Arc<SessionContext>>,
}

impl HoldbookHttpClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Build a client from validated configuration, applying its timeout.
    pub fn from_config(config: &HoldbookConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    /// Attach a session; requests carry its bearer token while it is active.
    pub fn with_session(mut self, session: Arc<SessionContext>) -> Self {
        self.session = Some(session);
        self
    }

    /// GET a JSON resource.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url).query(query);
        if let Some(token) = self.session.as_ref().and_then(|s| s.bearer()) {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(HoldbookError::Http {
                status,
                message: body,
            });
        }

        resp.json::<T>().await.map_err(HoldbookError::Request)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

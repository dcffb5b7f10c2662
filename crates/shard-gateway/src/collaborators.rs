//! External collaborators
//!
//! The session only needs two things from the outside world: where the gateway is,
//! and somewhere to mirror events when state tracking is enabled.

use crate::error::{GatewayError, GatewayResult};
use crate::events::Event;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Resolves the gateway WebSocket URL
#[async_trait]
pub trait GatewayLocator: Send + Sync {
    async fn gateway_url(&self) -> GatewayResult<String>;
}

/// Locator returning a fixed URL
#[derive(Debug, Clone)]
pub struct StaticGatewayLocator {
    url: String,
}

impl StaticGatewayLocator {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GatewayLocator for StaticGatewayLocator {
    async fn gateway_url(&self) -> GatewayResult<String> {
        Ok(self.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    url: String,
}

/// Locator asking the REST API (`GET {api}/gateway`, unauthenticated)
#[derive(Debug, Clone)]
pub struct HttpGatewayLocator {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpGatewayLocator {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a locator for the given API base URL, sending `user_agent` with each request
    pub fn new(api_base_url: impl Into<String>, user_agent: &str) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Locator(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/gateway", self.api_base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GatewayLocator for HttpGatewayLocator {
    async fn gateway_url(&self) -> GatewayResult<String> {
        let endpoint = self.endpoint();
        tracing::debug!(endpoint = %endpoint, "Requesting gateway URL");

        let response: GatewayResponse = self
            .client
            .get(&endpoint)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| GatewayError::Locator(e.to_string()))?
            .json()
            .await
            .map_err(|e| GatewayError::Locator(e.to_string()))?;

        Ok(response.url)
    }
}

/// Receives every decoded event before user handlers when state tracking is enabled
pub trait StateTracker: Send + Sync {
    fn update(&self, event: &Event);
}

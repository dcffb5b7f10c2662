//! Session configuration and builder

use super::Session;
use crate::collaborators::{
    GatewayLocator, HttpGatewayLocator, StateTracker, StaticGatewayLocator,
};
use crate::error::GatewayResult;
use crate::protocol::{IdentifyPayload, IdentifyProperties, Intents, PresenceUpdatePayload};
use crate::ratelimit::RateLimiter;
use shard_common::{ClientConfig, ConfigError, LogLevel};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Settings a session is built with; immutable once the session exists
#[derive(Clone)]
pub struct SessionConfig {
    pub token: String,
    pub intents: Intents,
    pub shard_id: u32,
    pub shard_count: u32,
    pub large_threshold: u32,
    pub compress: bool,
    /// Presence sent with Identify
    pub presence: Option<PresenceUpdatePayload>,
    pub properties: IdentifyProperties,
    pub connect_timeout: Duration,
    /// Bound on waiting for Hello, and for READY/RESUMED after Identify/Resume
    pub handshake_timeout: Duration,
    /// Reconnect when the transport fails without a close code
    pub reconnect_on_error: bool,
    pub reconnect_min_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Forward events to the state tracker, if one is attached
    pub state_enabled: bool,
    pub rate_limit: u32,
    pub rate_limit_interval: Duration,
    pub user_agent: String,
    /// Carried for REST collaborators; the gateway session does not use it
    pub mfa: bool,
    pub log_level: LogLevel,
}

impl SessionConfig {
    /// Build the Identify payload for a new connection attempt
    #[must_use]
    pub fn identify_payload(&self) -> IdentifyPayload {
        IdentifyPayload {
            token: self.token.clone(),
            properties: self.properties.clone(),
            compress: self.compress,
            large_threshold: self.large_threshold,
            shard: (self.shard_count > 1).then_some([self.shard_id, self.shard_count]),
            presence: self.presence.clone(),
            intents: self.intents,
        }
    }

    fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            token: config.token.clone(),
            intents: config
                .gateway
                .intents
                .map_or_else(Intents::default, Intents::from_raw),
            shard_id: config.shard.id,
            shard_count: config.shard.count,
            large_threshold: config.gateway.large_threshold,
            compress: config.gateway.compress,
            presence: None,
            properties: IdentifyProperties::new(),
            connect_timeout: Duration::from_millis(config.gateway.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(config.gateway.handshake_timeout_ms),
            reconnect_on_error: config.reconnect.on_error,
            reconnect_min_delay: Duration::from_millis(config.reconnect.min_delay_ms),
            reconnect_max_delay: Duration::from_millis(config.reconnect.max_delay_ms),
            state_enabled: config.state_enabled,
            rate_limit: config.rate_limit.frames,
            rate_limit_interval: Duration::from_millis(config.rate_limit.window_ms),
            user_agent: config.gateway.user_agent.clone(),
            mfa: config.mfa,
            log_level: config.log_level,
        }
    }

    fn validate(&self) -> GatewayResult<()> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingVar("DISCORD_TOKEN").into());
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::InvalidValue("GATEWAY_RATE_LIMIT", "0".to_string()).into());
        }
        if self.shard_count == 0 || self.shard_id >= self.shard_count {
            return Err(ConfigError::InvalidValue(
                "SHARD_ID",
                format!("{} (shard count is {})", self.shard_id, self.shard_count),
            )
            .into());
        }
        if self.reconnect_min_delay > self.reconnect_max_delay {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_MIN_DELAY_MS",
                format!("{:?} exceeds {:?}", self.reconnect_min_delay, self.reconnect_max_delay),
            )
            .into());
        }
        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("shard_id", &self.shard_id)
            .field("shard_count", &self.shard_count)
            .field("large_threshold", &self.large_threshold)
            .field("compress", &self.compress)
            .field("reconnect_on_error", &self.reconnect_on_error)
            .field("state_enabled", &self.state_enabled)
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_interval", &self.rate_limit_interval)
            .finish()
    }
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    config: SessionConfig,
    api_base_url: String,
    locator: Option<Arc<dyn GatewayLocator>>,
    tracker: Option<Arc<dyn StateTracker>>,
}

impl SessionBuilder {
    /// Start from the default configuration for `token`
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_client_config(&ClientConfig::new(token))
    }

    /// Start from an environment-derived configuration
    ///
    /// A configured gateway URL is used as-is; otherwise the URL is looked up through
    /// the REST API at `api_base_url`.
    pub fn from_config(config: &ClientConfig) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self::with_client_config(config))
    }

    fn with_client_config(config: &ClientConfig) -> Self {
        let locator = config
            .gateway
            .url
            .as_ref()
            .map(|url| Arc::new(StaticGatewayLocator::new(url.clone())) as Arc<dyn GatewayLocator>);

        Self {
            config: SessionConfig::from_client_config(config),
            api_base_url: config.gateway.api_base_url.clone(),
            locator,
            tracker: None,
        }
    }

    pub fn intents(mut self, intents: Intents) -> Self {
        self.config.intents = intents;
        self
    }

    /// Position of this session in the shard set
    pub fn shard(mut self, id: u32, count: u32) -> Self {
        self.config.shard_id = id;
        self.config.shard_count = count;
        self
    }

    /// Clamped to the 50..=250 range the gateway accepts
    pub fn large_threshold(mut self, threshold: u32) -> Self {
        self.config.large_threshold =
            threshold.clamp(ClientConfig::MIN_LARGE_THRESHOLD, ClientConfig::MAX_LARGE_THRESHOLD);
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.config.compress = compress;
        self
    }

    pub fn presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.config.presence = Some(presence);
        self
    }

    pub fn properties(mut self, properties: IdentifyProperties) -> Self {
        self.config.properties = properties;
        self
    }

    /// Connect to a fixed gateway URL instead of looking it up
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.locator = Some(Arc::new(StaticGatewayLocator::new(url)));
        self
    }

    pub fn locator(mut self, locator: impl GatewayLocator + 'static) -> Self {
        self.locator = Some(Arc::new(locator));
        self
    }

    pub fn state_tracker(mut self, tracker: impl StateTracker + 'static) -> Self {
        self.tracker = Some(Arc::new(tracker));
        self
    }

    pub fn state_enabled(mut self, enabled: bool) -> Self {
        self.config.state_enabled = enabled;
        self
    }

    pub fn reconnect_on_error(mut self, reconnect: bool) -> Self {
        self.config.reconnect_on_error = reconnect;
        self
    }

    /// Bounds of the exponential reconnect backoff
    pub fn reconnect_delays(mut self, min: Duration, max: Duration) -> Self {
        self.config.reconnect_min_delay = min;
        self.config.reconnect_max_delay = max;
        self
    }

    /// Outbound budget: `frames` per `interval`
    pub fn rate_limit(mut self, frames: u32, interval: Duration) -> Self {
        self.config.rate_limit = frames;
        self.config.rate_limit_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn build(self) -> GatewayResult<Session> {
        self.config.validate()?;

        let locator = match self.locator {
            Some(locator) => locator,
            None => Arc::new(HttpGatewayLocator::new(
                self.api_base_url,
                &self.config.user_agent,
            )?),
        };
        let limiter = RateLimiter::new(self.config.rate_limit, self.config.rate_limit_interval);

        Ok(Session::from_parts(self.config, locator, self.tracker, limiter))
    }
}

//! Gateway client configuration
//!
//! Loads shard configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Main client configuration for one gateway shard
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Bot token sent in Identify and Resume
    pub token: String,
    pub gateway: GatewaySettings,
    pub shard: ShardSettings,
    pub rate_limit: RateLimitSettings,
    pub reconnect: ReconnectSettings,
    /// Forward every dispatched event to the attached state tracker
    #[serde(default = "default_true")]
    pub state_enabled: bool,
    /// Require multi-factor confirmation for sensitive REST actions
    #[serde(default)]
    pub mfa: bool,
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Gateway endpoint and handshake settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Fixed gateway URL; resolved through the REST API when absent
    pub url: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub compress: bool,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    /// Raw intents bitmask; the library default is used when absent
    pub intents: Option<u64>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

/// Position of this session in the shard set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ShardSettings {
    #[serde(default)]
    pub id: u32,
    #[serde(default = "default_shard_count")]
    pub count: u32,
}

impl ShardSettings {
    /// Whether this configuration actually shards (more than one shard)
    #[must_use]
    pub fn is_sharded(&self) -> bool {
        self.count > 1
    }
}

/// Outbound gateway frame rate limit
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_frames")]
    pub frames: u32,
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
}

/// Reconnect policy
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReconnectSettings {
    /// Reconnect automatically on transport errors instead of surfacing them
    #[serde(default = "default_true")]
    pub on_error: bool,
    #[serde(default = "default_reconnect_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Verbosity of internal diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map to the equivalent `tracing` level
    #[must_use]
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    /// Accepts level names as well as the numeric levels 0 (error) to 3 (debug).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" | "0" => Ok(Self::Error),
            "warn" | "warning" | "1" => Ok(Self::Warn),
            "info" | "informational" | "2" => Ok(Self::Info),
            "debug" | "3" => Ok(Self::Debug),
            "trace" | "4" => Ok(Self::Trace),
            other => Err(ConfigError::InvalidValue("LOG_LEVEL", other.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/shard-gateway/shard-gateway, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_large_threshold() -> u32 {
    250
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_handshake_timeout_ms() -> u64 {
    30_000
}

fn default_shard_count() -> u32 {
    1
}

fn default_rate_limit_frames() -> u32 {
    120
}

fn default_rate_limit_window_ms() -> u64 {
    60_000 // 1 minute
}

fn default_reconnect_min_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    600_000 // 10 minutes
}

impl ClientConfig {
    /// Minimum large-guild threshold accepted by the gateway
    pub const MIN_LARGE_THRESHOLD: u32 = 50;
    /// Maximum large-guild threshold accepted by the gateway
    pub const MAX_LARGE_THRESHOLD: u32 = 250;

    /// Create a configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gateway: GatewaySettings {
                url: None,
                api_base_url: default_api_base_url(),
                user_agent: default_user_agent(),
                compress: false,
                large_threshold: default_large_threshold(),
                intents: None,
                connect_timeout_ms: default_connect_timeout_ms(),
                handshake_timeout_ms: default_handshake_timeout_ms(),
            },
            shard: ShardSettings {
                id: 0,
                count: default_shard_count(),
            },
            rate_limit: RateLimitSettings {
                frames: default_rate_limit_frames(),
                window_ms: default_rate_limit_window_ms(),
            },
            reconnect: ReconnectSettings {
                on_error: true,
                min_delay_ms: default_reconnect_min_delay_ms(),
                max_delay_ms: default_reconnect_max_delay_ms(),
            },
            state_enabled: true,
            mfa: false,
            log_level: LogLevel::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `DISCORD_TOKEN` is missing or a value fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("DISCORD_TOKEN"))?;

        let mut config = Self::new(token.trim());

        config.gateway.url = lookup("GATEWAY_URL").filter(|u| !u.trim().is_empty());
        if let Some(url) = lookup("API_BASE_URL") {
            config.gateway.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(agent) = lookup("USER_AGENT") {
            config.gateway.user_agent = agent;
        }
        config.gateway.compress = parse_or(&lookup, "GATEWAY_COMPRESS", false, parse_bool)?;
        config.gateway.large_threshold = parse_or(
            &lookup,
            "LARGE_THRESHOLD",
            default_large_threshold(),
            parse_number,
        )?
        .clamp(Self::MIN_LARGE_THRESHOLD, Self::MAX_LARGE_THRESHOLD);
        config.gateway.intents = lookup("INTENTS")
            .map(|raw| parse_number::<u64>(&raw).ok_or(ConfigError::InvalidValue("INTENTS", raw)))
            .transpose()?;
        config.gateway.connect_timeout_ms = parse_or(
            &lookup,
            "GATEWAY_CONNECT_TIMEOUT_MS",
            default_connect_timeout_ms(),
            parse_number,
        )?;
        config.gateway.handshake_timeout_ms = parse_or(
            &lookup,
            "GATEWAY_HANDSHAKE_TIMEOUT_MS",
            default_handshake_timeout_ms(),
            parse_number,
        )?;

        config.shard.id = parse_or(&lookup, "SHARD_ID", 0, parse_number)?;
        config.shard.count = parse_or(&lookup, "SHARD_COUNT", default_shard_count(), parse_number)?;

        config.rate_limit.frames = parse_or(
            &lookup,
            "GATEWAY_RATE_LIMIT",
            default_rate_limit_frames(),
            parse_number,
        )?;
        config.rate_limit.window_ms = parse_or(
            &lookup,
            "GATEWAY_RATE_WINDOW_MS",
            default_rate_limit_window_ms(),
            parse_number,
        )?;

        config.reconnect.on_error = parse_or(&lookup, "RECONNECT_ON_ERROR", true, parse_bool)?;
        config.reconnect.min_delay_ms = parse_or(
            &lookup,
            "RECONNECT_MIN_DELAY_MS",
            default_reconnect_min_delay_ms(),
            parse_number,
        )?;
        config.reconnect.max_delay_ms = parse_or(
            &lookup,
            "RECONNECT_MAX_DELAY_MS",
            default_reconnect_max_delay_ms(),
            parse_number,
        )?;

        config.state_enabled = parse_or(&lookup, "STATE_ENABLED", true, parse_bool)?;
        config.mfa = parse_or(&lookup, "MFA", false, parse_bool)?;
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard.count == 0 {
            return Err(ConfigError::InvalidValue("SHARD_COUNT", "0".to_string()));
        }
        if self.shard.id >= self.shard.count {
            return Err(ConfigError::InvalidValue(
                "SHARD_ID",
                format!("{} (shard count is {})", self.shard.id, self.shard.count),
            ));
        }
        if self.rate_limit.frames == 0 {
            return Err(ConfigError::InvalidValue("GATEWAY_RATE_LIMIT", "0".to_string()));
        }
        if self.reconnect.min_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_MIN_DELAY_MS",
                format!(
                    "{} exceeds RECONNECT_MAX_DELAY_MS {}",
                    self.reconnect.min_delay_ms, self.reconnect.max_delay_ms
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"<redacted>")
            .field("gateway", &self.gateway)
            .field("shard", &self.shard)
            .field("rate_limit", &self.rate_limit)
            .field("reconnect", &self.reconnect)
            .field("state_enabled", &self.state_enabled)
            .field("mfa", &self.mfa)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn parse_or<F, T>(
    lookup: &F,
    key: &'static str,
    default: T,
    parse: fn(&str) -> Option<T>,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse(&raw).ok_or(ConfigError::InvalidValue(key, raw)),
        None => Ok(default),
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

//! Server configuration loaded from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use chrono_tz::Tz;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_FRONTEND_DIR: &str = "frontend/dist";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;
pub const DEFAULT_MAX_EVENTS: i32 = 2500;
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openrouter/sonoma-dusk-alpha";
pub const DEFAULT_AGENT_MAX_RETRIES: u32 = 3;

/// Settings for the two-stage scheduling agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl AgentConfig {
    /// Load agent configuration from environment variables.
    ///
    /// Required env vars:
    /// - `OPENROUTER_API_KEY`
    ///
    /// Optional: `OPENROUTER_BASE_URL`, `DAGR_MODEL`, `DAGR_AGENT_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let api_key = var("OPENROUTER_API_KEY").ok_or_else(|| "OPENROUTER_API_KEY must be set".to_string())?;

        Ok(Self {
            api_key,
            base_url: var("OPENROUTER_BASE_URL")
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            model: var("DAGR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_retries: var("DAGR_AGENT_MAX_RETRIES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_AGENT_MAX_RETRIES),
            retry_backoff: Duration::from_millis(500),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub frontend_dir: String,
    pub time_zone: Tz,
    pub max_events: i32,
    pub agent: AgentConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. `from_env` reads the
    /// process environment.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|e| format!("BIND_ADDR '{}' is not a socket address: {}", bind_addr, e))?;

        let time_zone = match var("DAGR_TIMEZONE") {
            Some(name) => parse_time_zone(&name)?,
            None => DEFAULT_TIMEZONE,
        };

        Ok(Self {
            bind_addr,
            frontend_dir: var("FRONTEND_DIR").unwrap_or_else(|| DEFAULT_FRONTEND_DIR.to_string()),
            time_zone,
            max_events: var("DAGR_MAX_EVENTS")
                .and_then(|s| s.trim().parse().ok())
                .filter(|n: &i32| *n > 0)
                .unwrap_or(DEFAULT_MAX_EVENTS),
            agent: AgentConfig::from_lookup(&var)?,
        })
    }
}

/// Parse an IANA zone name such as `Europe/Zurich`.
pub fn parse_time_zone(name: &str) -> Result<Tz, String> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| format!("DAGR_TIMEZONE '{}' is not an IANA time zone", name))
}

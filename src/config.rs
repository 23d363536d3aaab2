//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{Quota, RouteRule, RouteRules};

/// Prefix for environment overrides, e.g. `TOLLGATE__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Take the caller IP from the first `X-Forwarded-For` hop
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trust_forwarded_for: false,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Quota applied to routes without a specific rule
    #[serde(default)]
    pub default_quota: Quota,

    /// Route specific quotas
    #[serde(default)]
    pub routes: Vec<RouteRule>,

    /// Optional YAML file with route rules, replacing `default_quota` and `routes`
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Minimum idle time in seconds before a window may be evicted
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,

    /// Interval in seconds between eviction sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Number of store shards, a power of two; derived from the CPU count when unset
    #[serde(default)]
    pub shard_amount: Option<usize>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            default_quota: Quota::default(),
            routes: Vec::new(),
            rules_path: None,
            idle_eviction_secs: default_idle_eviction(),
            sweep_interval_secs: default_sweep_interval(),
            shard_amount: None,
        }
    }
}

fn default_idle_eviction() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Build the route rules, reading `rules_path` when set.
    pub fn route_rules(&self) -> Result<RouteRules> {
        if let Some(ref path) = self.rules_path {
            return RouteRules::from_file(path);
        }

        let rules = RouteRules {
            default: self.default_quota,
            routes: self.routes.clone(),
        };
        rules.validate()?;
        Ok(rules)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from a file path, with environment overrides.
    ///
    /// The format follows the file extension (YAML, TOML or JSON).
    pub fn from_file(path: &str) -> Result<Self> {
        let config: TollgateConfig = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.idle_eviction_secs == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "idle_eviction_secs must be positive".to_string(),
            ));
        }
        if rl.sweep_interval_secs == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if let Some(n) = rl.shard_amount {
            if n < 2 || !n.is_power_of_two() {
                return Err(TollgateError::InvalidConfiguration(format!(
                    "shard_amount must be a power of two greater than one, got {}",
                    n
                )));
            }
        }
        Ok(())
    }
}

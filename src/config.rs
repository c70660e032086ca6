//! Configuration management for Tollgate.
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `TOLLGATE__<SECTION>__<FIELD>` environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Result, TollgateError};
use crate::ratelimit::{KeyStrategy, LimiterConfig};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Demo handler configuration
    #[serde(default)]
    pub handlers: HandlerConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per window, per key
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Idle period in milliseconds after which a key's counter is dropped
    #[serde(default = "default_idle_ttl_ms")]
    pub idle_ttl_ms: u64,

    /// Sweep interval in milliseconds; defaults to the idle TTL
    #[serde(default)]
    pub sweep_interval_ms: Option<u64>,

    /// How requests are mapped to keys
    #[serde(default)]
    pub key_strategy: KeyStrategy,

    /// Trust `X-Forwarded-For` / `X-Real-IP` for the client identity
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            idle_ttl_ms: default_idle_ttl_ms(),
            sweep_interval_ms: None,
            key_strategy: KeyStrategy::default(),
            trust_proxy: false,
        }
    }
}

fn default_limit() -> u64 {
    10
}

fn default_window_ms() -> u64 {
    1000
}

fn default_idle_ttl_ms() -> u64 {
    1000
}

impl RateLimitingConfig {
    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Idle TTL.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }

    /// Sweep interval, falling back to the idle TTL.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.unwrap_or(self.idle_ttl_ms))
    }

    /// Limiter parameters described by this section.
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig::new(self.limit, self.window())
            .with_idle_ttl(self.idle_ttl())
            .with_sweep_interval(self.sweep_interval())
    }
}

/// Configuration for the demo endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Lower bound of the simulated processing delay, in milliseconds
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound (exclusive) of the simulated processing delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    1500
}

impl HandlerConfig {
    /// No simulated delay at all.
    pub fn immediate() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

impl TollgateConfig {
    /// Load configuration from defaults, an optional file, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: TollgateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(Path::new(path)))
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a usable limiter.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;

        if rl.limit == 0 {
            return Err(TollgateError::Config(
                "rate_limiting.limit must be greater than zero".to_string(),
            ));
        }
        if rl.window_ms == 0 {
            return Err(TollgateError::Config(
                "rate_limiting.window_ms must be greater than zero".to_string(),
            ));
        }
        if rl.idle_ttl_ms == 0 {
            return Err(TollgateError::Config(
                "rate_limiting.idle_ttl_ms must be greater than zero".to_string(),
            ));
        }
        if rl.sweep_interval_ms == Some(0) {
            return Err(TollgateError::Config(
                "rate_limiting.sweep_interval_ms must be greater than zero".to_string(),
            ));
        }

        if rl.idle_ttl_ms < rl.window_ms {
            warn!(
                idle_ttl_ms = rl.idle_ttl_ms,
                window_ms = rl.window_ms,
                "idle TTL is shorter than the window; idle keys may be forgotten mid-window"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::default();

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.rate_limiting.limit, 10);
        assert_eq!(config.rate_limiting.window(), Duration::from_secs(1));
        assert_eq!(config.rate_limiting.idle_ttl(), Duration::from_secs(1));
        assert_eq!(config.rate_limiting.key_strategy, KeyStrategy::Route);
        assert_eq!(config.handlers.min_delay_ms, 500);
        assert_eq!(config.handlers.max_delay_ms, 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  listen_addr: 127.0.0.1:9000
rate_limiting:
  limit: 5
  window_ms: 2000
  idle_ttl_ms: 10000
  key_strategy: client
  trust_proxy: true
handlers:
  min_delay_ms: 0
  max_delay_ms: 10
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.server.max_body_bytes, 1024 * 1024);
        assert_eq!(config.rate_limiting.limit, 5);
        assert_eq!(config.rate_limiting.key_strategy, KeyStrategy::Client);
        assert!(config.rate_limiting.trust_proxy);
        assert_eq!(config.handlers.max_delay_ms, 10);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = TollgateConfig::from_yaml("rate_limiting:\n  limit: 3\n").unwrap();

        assert_eq!(config.rate_limiting.limit, 3);
        assert_eq!(config.rate_limiting.window_ms, 1000);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_limiter_config_from_section() {
        let section = RateLimitingConfig {
            limit: 7,
            window_ms: 500,
            idle_ttl_ms: 3000,
            sweep_interval_ms: None,
            ..Default::default()
        };
        let limiter = section.limiter_config();

        assert_eq!(limiter.limit, 7);
        assert_eq!(limiter.window, Duration::from_millis(500));
        assert_eq!(limiter.idle_ttl, Duration::from_secs(3));
        assert_eq!(limiter.sweep_interval, Duration::from_secs(3));

        let section = RateLimitingConfig {
            sweep_interval_ms: Some(250),
            ..section
        };
        assert_eq!(
            section.limiter_config().sweep_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let result = TollgateConfig::from_yaml("rate_limiting:\n  limit: 0\n");
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = TollgateConfig::default();
        config.rate_limiting.window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = TollgateConfig::default();
        config.rate_limiting.sweep_interval_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = TollgateConfig::from_yaml("rate_limiting: [not, a, map]");
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TollgateConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.limit, 10);
    }

    #[test]
    fn test_from_file_with_env_override() {
        let path = std::env::temp_dir().join(format!("tollgate-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "rate_limiting:\n  limit: 4\n  window_ms: 2000\nhandlers:\n  max_delay_ms: 900\n",
        )
        .unwrap();
        std::env::set_var("TOLLGATE__HANDLERS__MAX_DELAY_MS", "42");

        let result = TollgateConfig::from_file(path.to_str().unwrap());

        std::env::remove_var("TOLLGATE__HANDLERS__MAX_DELAY_MS");
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.rate_limiting.limit, 4);
        assert_eq!(config.rate_limiting.window(), Duration::from_secs(2));
        assert_eq!(config.handlers.min_delay_ms, 500);
        assert_eq!(config.handlers.max_delay_ms, 42);
    }

    #[test]
    fn test_from_file_missing() {
        let result = TollgateConfig::from_file("/nonexistent/tollgate.yaml");
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }
}

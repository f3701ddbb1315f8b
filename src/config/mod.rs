use crate::auth::jwt::parse_algorithm;
use crate::error::{Result, ServiceError};
use crate::rate_limit::RateLimitPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g.
/// `EXPENSE_TRACKER__RATE_LIMIT__POLICY=100-H`
pub const ENV_PREFIX: &str = "EXPENSE_TRACKER";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Token issuance and verification
    pub auth: AuthConfig,
    /// Admission rate limiting
    pub rate_limit: RateLimitConfig,
    /// Log output
    pub logging: LoggingConfig,
    /// Prometheus metrics
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Grace period for in-flight requests after a shutdown signal
    pub shutdown_timeout_secs: u64,
}

/// Token configuration. The signing secret itself comes from the
/// secrets manager, never from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC algorithm (HS256, HS384 or HS512)
    pub algorithm: String,
    /// Lifetime of issued tokens in seconds
    pub token_ttl_secs: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Policy in `<N>-<S|M|H|D>` form
    pub policy: String,
    /// Cap on tracked identities; unset means unbounded
    pub max_identities: Option<usize>,
    /// How often expired windows are swept
    pub sweep_interval_secs: u64,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose `/metrics`
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            policy: "10-M".to_string(),
            max_identities: Some(100_000),
            sweep_interval_secs: 60,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ServiceConfig {
    /// Load configuration from an optional YAML file layered under
    /// `EXPENSE_TRACKER__*` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to load config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(ServiceError::Config("Server host cannot be empty".to_string()));
        }

        parse_algorithm(&self.auth.algorithm)?;

        if self.auth.token_ttl_secs == 0 {
            return Err(ServiceError::Config(
                "Token TTL must be > 0".to_string(),
            ));
        }

        self.rate_limit_policy()?;

        if self.rate_limit.max_identities == Some(0) {
            return Err(ServiceError::Config(
                "Rate limit max_identities must be > 0 when set".to_string(),
            ));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(ServiceError::Config(
                "Rate limit sweep interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse the configured rate policy
    pub fn rate_limit_policy(&self) -> Result<RateLimitPolicy> {
        self.rate_limit.policy.parse()
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.sweep_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

//! # Configuration Module
//!
//! Startup configuration for the provisioner. The process-wide host/port globals of a classic
//! single-file server become an explicit [`ProvisionerConfig`] that is loaded once and handed
//! to the HTTP front end and the adapter factories.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Environment variable override support (`PROVISIONER_<SECTION>_<FIELD>`)
//! - Comprehensive validation with every problem reported at once

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::core::error::{ProvisionerError, ProvisionerResult};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "PROVISIONER_CONFIG_PATH";

/// Configuration file used when [`CONFIG_PATH_ENV`] is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/provisioner.yaml";

/// Main provisioner configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// HTTP front end settings
    pub server: ServerConfig,

    /// Hostname resolution
    pub dns: DnsConfig,

    /// Virtual server address allocation
    pub ipam: IpamConfig,

    /// Load-balancer control plane
    pub load_balancer: LoadBalancerConfig,

    /// Timeout and retry policy applied to every adapter call
    pub retry: RetryConfig,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

impl ProvisionerConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProvisionerResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProvisionerError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: ProvisionerConfig = serde_yaml::from_str(&content)
            .map_err(|e| ProvisionerError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> ProvisionerResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProvisionerError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: ProvisionerConfig = serde_json::from_str(&content).map_err(|e| {
            ProvisionerError::config(format!("Failed to parse JSON config: {}", e))
        })?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the path named by `PROVISIONER_CONFIG_PATH`
    ///
    /// An explicitly named file must exist. When the variable is unset and the default file
    /// is absent, built-in defaults (plus environment overrides) are used.
    pub async fn load() -> ProvisionerResult<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_path(&path).await,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_path(DEFAULT_CONFIG_PATH).await
            }
            Err(_) => {
                tracing::warn!(
                    path = DEFAULT_CONFIG_PATH,
                    "Configuration file not found, using built-in defaults"
                );
                let mut config = Self::default();
                config.apply_env_overrides()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    async fn load_path(path: &str) -> ProvisionerResult<Self> {
        if Path::new(path).extension().and_then(|s| s.to_str()) == Some("json") {
            Self::load_from_json(path).await
        } else {
            Self::load_from_file(path).await
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) -> ProvisionerResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    ///
    /// Keys follow the pattern `PROVISIONER_<SECTION>_<FIELD>`,
    /// for example `PROVISIONER_SERVER_HTTP_PORT=9090`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ProvisionerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("PROVISIONER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("PROVISIONER_SERVER_HTTP_PORT") {
            self.server.http_port = parse_override("PROVISIONER_SERVER_HTTP_PORT", &port)?;
        }

        if let Some(dir) = lookup("PROVISIONER_SERVER_STATIC_DIR") {
            self.server.static_dir = dir;
        }

        if let Some(size) = lookup("PROVISIONER_SERVER_MAX_REQUEST_SIZE") {
            self.server.max_request_size =
                parse_override("PROVISIONER_SERVER_MAX_REQUEST_SIZE", &size)?;
        }

        if let Some(timeout) = lookup("PROVISIONER_SERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                ProvisionerError::config(format!(
                    "Invalid PROVISIONER_SERVER_REQUEST_TIMEOUT: {}",
                    e
                ))
            })?;
        }

        if let Some(attempts) = lookup("PROVISIONER_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_override("PROVISIONER_RETRY_MAX_ATTEMPTS", &attempts)?;
        }

        if let Some(timeout) = lookup("PROVISIONER_RETRY_ATTEMPT_TIMEOUT") {
            self.retry.attempt_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                ProvisionerError::config(format!(
                    "Invalid PROVISIONER_RETRY_ATTEMPT_TIMEOUT: {}",
                    e
                ))
            })?;
        }

        // Credentials are usually injected as secrets rather than written to the file
        if let LoadBalancerConfig::Nitro(ref mut nitro) = self.load_balancer {
            if let Some(url) = lookup("PROVISIONER_NITRO_URL") {
                nitro.url = url;
            }
            if let Some(username) = lookup("PROVISIONER_NITRO_USERNAME") {
                nitro.username = username;
            }
            if let Some(password) = lookup("PROVISIONER_NITRO_PASSWORD") {
                nitro.password = password;
            }
        }

        if let IpamConfig::Infoblox(ref mut infoblox) = self.ipam {
            if let Some(url) = lookup("PROVISIONER_INFOBLOX_URL") {
                infoblox.url = url;
            }
            if let Some(username) = lookup("PROVISIONER_INFOBLOX_USERNAME") {
                infoblox.username = username;
            }
            if let Some(password) = lookup("PROVISIONER_INFOBLOX_PASSWORD") {
                infoblox.password = password;
            }
        }

        if let Some(level) = lookup("PROVISIONER_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("PROVISIONER_LOG_FORMAT") {
            self.observability.logging.format = format.parse()?;
        }

        if let Some(enabled) = lookup("PROVISIONER_METRICS_ENABLED") {
            self.observability.metrics.enabled =
                parse_override("PROVISIONER_METRICS_ENABLED", &enabled)?;
        }

        Ok(())
    }

    /// Comprehensive configuration validation with detailed error messages
    pub fn validate(&self) -> ProvisionerResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.http_port == 0 {
            errors.push("http_port must be greater than 0".to_string());
        }

        if self.server.max_request_size == 0 {
            errors.push("max_request_size must be greater than 0".to_string());
        }

        if self.server.request_timeout.is_zero() {
            errors.push("request_timeout must be greater than 0".to_string());
        }

        if self.server.static_dir.is_empty() {
            errors.push("static_dir cannot be empty".to_string());
        }

        if self.server.default_document.is_empty() || self.server.default_document.contains('/') {
            errors.push(format!(
                "default_document must be a plain file name, got: {:?}",
                self.server.default_document
            ));
        }

        if self.dns.timeout.is_zero() {
            errors.push("dns timeout must be greater than 0".to_string());
        }

        if self.dns.attempts == 0 {
            errors.push("dns attempts must be greater than 0".to_string());
        }

        if self.retry.max_attempts == 0 {
            errors.push("retry max_attempts must be greater than 0".to_string());
        }

        if self.retry.backoff_multiplier < 1.0 {
            errors.push(format!(
                "retry backoff_multiplier must be at least 1.0, got: {}",
                self.retry.backoff_multiplier
            ));
        }

        if self.retry.attempt_timeout.is_zero() {
            errors.push("retry attempt_timeout must be greater than 0".to_string());
        }

        if self.retry.max_backoff < self.retry.initial_backoff {
            errors.push("retry max_backoff must not be smaller than initial_backoff".to_string());
        }

        match &self.ipam {
            IpamConfig::Fixed { .. } => {}
            IpamConfig::Infoblox(infoblox) => {
                if let Err(e) = Url::parse(&infoblox.url) {
                    errors.push(format!("Infoblox url is invalid: {}", e));
                }
                if infoblox.username.is_empty() {
                    errors.push("Infoblox username cannot be empty".to_string());
                }
                if infoblox.wapi_version.is_empty() {
                    errors.push("Infoblox wapi_version cannot be empty".to_string());
                }
                if infoblox.networks.is_empty() && infoblox.default_network.is_none() {
                    errors.push(
                        "Infoblox needs at least one network mapping or a default_network"
                            .to_string(),
                    );
                }
            }
        }

        match &self.load_balancer {
            LoadBalancerConfig::DryRun => {}
            LoadBalancerConfig::Nitro(nitro) => {
                if let Err(e) = Url::parse(&nitro.url) {
                    errors.push(format!("NITRO url is invalid: {}", e));
                }
                if nitro.username.is_empty() {
                    errors.push("NITRO username cannot be empty".to_string());
                }
                if nitro.timeout.is_zero() {
                    errors.push("NITRO timeout must be greater than 0".to_string());
                }
            }
        }

        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!(
                "Invalid log level: {}",
                self.observability.logging.level
            )),
        }

        if !self.observability.metrics.endpoint_path.starts_with('/') {
            errors.push(format!(
                "metrics endpoint_path must start with '/', got: {}",
                self.observability.metrics.endpoint_path
            ));
        }

        if !errors.is_empty() {
            return Err(ProvisionerError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

fn parse_override<T>(key: &str, value: &str) -> ProvisionerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ProvisionerError::config(format!("Invalid {}: {}", key, e)))
}

/// HTTP front end configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name or address to bind
    pub bind_address: String,

    /// HTTP port
    pub http_port: u16,

    /// Directory static assets are served from
    pub static_dir: String,

    /// Document served for `/` and for any path that does not exist
    pub default_document: String,

    /// Maximum request body size in bytes
    pub max_request_size: usize,

    /// Upper bound for handling one request, adapter calls included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "localhost".to_string(),
            http_port: 8080,
            static_dir: "./static".to_string(),
            default_document: "index.html".to_string(),
            max_request_size: 1024 * 1024, // 1MB
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// DNS resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Per-query timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Attempts made by the resolver itself before reporting a failure
    pub attempts: usize,

    /// Fixed hostname to address overrides, consulted before the system resolver
    pub static_hosts: HashMap<String, IpAddr>,

    /// Fall back to the system resolver for names not in `static_hosts`
    pub use_system_resolver: bool,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 2,
            static_hosts: HashMap::new(),
            use_system_resolver: true,
        }
    }
}

/// Address allocation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpamConfig {
    /// Hand out one configured address for every virtual server
    Fixed { address: IpAddr },

    /// Reserve addresses through the Infoblox WAPI
    Infoblox(InfobloxConfig),
}

impl Default for IpamConfig {
    fn default() -> Self {
        Self::Fixed {
            address: IpAddr::from([10, 10, 10, 10]),
        }
    }
}

/// Infoblox WAPI connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfobloxConfig {
    /// Grid master base URL, e.g. `https://infoblox.example.com`
    pub url: String,

    pub username: String,

    #[serde(default)]
    pub password: String,

    /// WAPI version segment, e.g. `v2.12`
    #[serde(default = "default_wapi_version")]
    pub wapi_version: String,

    /// Network CIDR per `<dataCenter>/<networkZone>`
    #[serde(default)]
    pub networks: HashMap<String, String>,

    /// Network used when a scope has no mapping
    #[serde(default)]
    pub default_network: Option<String>,

    #[serde(default = "default_adapter_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Skip TLS verification (lab appliances with self-signed certificates)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_wapi_version() -> String {
    "v2.12".to_string()
}

fn default_adapter_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Load-balancer control plane backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoadBalancerConfig {
    /// Log every step without touching an appliance
    #[default]
    DryRun,

    /// Talk to a NetScaler through the NITRO REST API
    Nitro(NitroConfig),
}

/// NITRO API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NitroConfig {
    /// Management address, e.g. `https://10.0.0.5`
    pub url: String,

    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_adapter_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Skip TLS verification (appliances ship with self-signed certificates)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    pub backoff_multiplier: f64,

    /// Upper bound for a single attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LogConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = ProvisionerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(ProvisionerError::config(format!("Invalid log format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and expose it over HTTP
    pub enabled: bool,
    pub endpoint_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint_path: "/metrics".to_string(),
        }
    }
}

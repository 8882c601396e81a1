// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Credentials and endpoints for the source tenant's token authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Account used for delegated (password grant) tokens
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_scope() -> String {
    "https://graph.microsoft.com/.default".to_string()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            authority_url: default_authority_url(),
            scope: default_scope(),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub max_attempts: u32,
    /// Delay applied before every attempt, the first one included
    pub pacing_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl RequestConfig {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pacing_delay_ms: 10_000,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub poll_interval_seconds: u64,
    pub timeout_seconds: u64,
    /// Minutes added to "now" when deriving a schedule start time
    pub start_buffer_minutes: i64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            timeout_seconds: 600,
            start_buffer_minutes: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("SUITE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.graph.authority_url.is_empty() {
            return Err("Graph authority_url cannot be empty".to_string());
        }
        if self.graph.scope.is_empty() {
            return Err("Graph scope cannot be empty".to_string());
        }

        if self.request.max_attempts == 0 {
            return Err("Request max_attempts must be greater than 0".to_string());
        }
        if self.request.timeout_seconds == 0 {
            return Err("Request timeout_seconds must be greater than 0".to_string());
        }

        if self.trigger.poll_interval_seconds == 0 {
            return Err("Trigger poll_interval_seconds must be greater than 0".to_string());
        }
        if self.trigger.timeout_seconds == 0 {
            return Err("Trigger timeout_seconds must be greater than 0".to_string());
        }
        if self.trigger.start_buffer_minutes < 0 {
            return Err("Trigger start_buffer_minutes cannot be negative".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            request: RequestConfig::default(),
            trigger: TriggerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

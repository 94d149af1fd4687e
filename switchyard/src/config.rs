use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub listener: Listener,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub provider: ProviderConfig,
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Maps `service_accountname` claim values to service kinds.
    #[serde(default = "default_service_accounts")]
    pub service_accounts: HashMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            service_accounts: default_service_accounts(),
        }
    }
}

fn default_service_accounts() -> HashMap<String, String> {
    HashMap::from([("rh-che".to_string(), "che".to_string())])
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    pub cluster_api: String,
}

fn default_refresh_seconds() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config = serde_yaml::from_reader(file)?;
        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
}

/// Credentials and collaborator URLs, taken from the environment. All of
/// them are required; startup fails when any is absent.
#[derive(Debug)]
pub struct Secrets {
    pub tenant_url: String,
    pub auth_url: String,
    pub service_account_id: String,
    pub service_account_secret: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Presence-only check: signing keys are fetched from the auth
        // service, but a deployment without the key configured is broken.
        require_env("AUTH_TOKEN_KEY")?;
        Ok(Secrets {
            tenant_url: require_env("TENANT_URL")?,
            auth_url: require_env("AUTH_URL")?,
            service_account_id: require_env("SERVICE_ACCOUNT_ID")?,
            service_account_secret: require_env("SERVICE_ACCOUNT_SECRET")?,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

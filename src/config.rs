use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::RelayError;
use crate::session::EvictionPolicy;

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// No timeout when unset
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Working directory for spawned commands; the process cwd when unset
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Programs the model may run. Empty means anything goes.
    #[serde(default = "default_allowed_programs")]
    pub allowed_programs: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub max_sessions: Option<usize>,
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3002
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_allowed_programs() -> Vec<String> {
    [
        "echo", "ls", "pwd", "date", "whoami", "uname", "hostname", "uptime", "df", "free", "cat",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Listen address; `bind` is a bare IPv4 or IPv6 address.
    pub fn socket_addr(&self) -> Result<SocketAddr, RelayError> {
        let ip: IpAddr = self.bind.parse().map_err(|e| {
            RelayError::Config(format!("invalid bind address {:?}: {}", self.bind, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            request_timeout_secs: None,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            allowed_programs: default_allowed_programs(),
            timeout_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_sessions: self.max_sessions,
            idle_ttl: self.idle_ttl_secs.map(Duration::from_secs),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("reading {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("parsing {}: {}", path.display(), e)))?;
        info!(path = %path.display(), model = %config.model.model, "configuration loaded");
        Ok(config)
    }
}

/// Read the API key from the environment. Missing or blank is fatal.
pub fn api_key_from_env() -> Result<String, RelayError> {
    check_api_key(std::env::var(API_KEY_ENV).ok())
}

fn check_api_key(value: Option<String>) -> Result<String, RelayError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RelayError::Config(format!("{} is not set", API_KEY_ENV))),
    }
}

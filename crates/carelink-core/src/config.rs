//! Carelink configuration
//!
//! Loaded from `--config PATH` or `~/.carelink/config.toml`. String values may
//! reference environment variables as `${NAME}`; they are expanded at load time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Public doctor directory used by the provider search tool
pub const DEFAULT_DOCTORS_SOURCE: &str =
    "https://raw.githubusercontent.com/holtskinner/A2AWalkthrough/refs/heads/main/data/doctors.json";

/// Errors raised while loading or querying configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable '{0}' referenced in config is not set")]
    MissingEnv(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown agent '{name}'. Known agents: {known}")]
    UnknownAgent { name: String, known: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarelinkConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub doctors: DoctorsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

impl Default for CarelinkConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            polling: PollingConfig::default(),
            agents: default_agents(),
            doctors: DoctorsConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

/// HTTP transport settings shared by every agent connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_http_timeout() -> u64 {
    100
}

/// Task polling settings
///
/// `timeout_secs` unset means poll until the task reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            timeout_secs: None,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_poll_interval() -> u64 {
    1000
}

/// A remote A2A agent reachable over HTTP
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub url: String,
    /// Bearer token sent as `Authorization: Bearer <token>`; the value holds
    /// the token alone, without the scheme
    #[serde(default)]
    pub token: Option<String>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            token: None,
        }
    }

    /// Look up an agent by name, or treat the argument as a URL
    pub fn resolve(known: &[AgentConfig], name_or_url: &str) -> Result<AgentConfig, ConfigError> {
        if name_or_url.starts_with("http://") || name_or_url.starts_with("https://") {
            return Ok(AgentConfig::new(name_or_url, name_or_url));
        }

        known
            .iter()
            .find(|a| a.name == name_or_url)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownAgent {
                name: name_or_url.to_string(),
                known: known
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig::new("policy_agent", "http://localhost:9999"),
        AgentConfig::new("health_agent", "http://localhost:9998"),
        AgentConfig::new("providers_agent", "http://localhost:8001"),
    ]
}

/// Where the provider search tool loads its doctor directory from
///
/// `source` is either an http(s) URL or a local file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorsConfig {
    #[serde(default = "default_doctors_source")]
    pub source: String,
}

impl Default for DoctorsConfig {
    fn default() -> Self {
        Self {
            source: default_doctors_source(),
        }
    }
}

fn default_doctors_source() -> String {
    DEFAULT_DOCTORS_SOURCE.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// An external MCP server launched as a child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CarelinkConfig {
    /// `~/.carelink/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".carelink").join("config.toml"))
    }

    /// Load from an explicit path, or from the default path when it exists.
    /// Falls back to built-in defaults when no file is present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content, &path.display().to_string())?;
        info!(
            "Loaded config from {} ({} agents, {} MCP servers)",
            path.display(),
            config.agents.len(),
            config.mcp.servers.len()
        );
        Ok(config)
    }

    /// Parse TOML content; `origin` names the source in error messages
    pub fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let parse_err = |source: toml::de::Error| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        };

        let mut raw: toml::Value = toml::from_str(content).map_err(parse_err)?;
        expand_env(&mut raw)?;
        let config: CarelinkConfig = raw.try_into().map_err(parse_err)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "polling.interval_ms must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "agent '{}' has an empty url",
                    agent.name
                )));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "agent '{}' is defined more than once",
                    agent.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve a configured agent name or a literal URL
    pub fn agent(&self, name_or_url: &str) -> Result<AgentConfig, ConfigError> {
        AgentConfig::resolve(&self.agents, name_or_url)
    }

    pub fn mcp_server(&self, name: &str) -> Option<&McpServerConfig> {
        self.mcp.servers.iter().find(|s| s.name == name)
    }
}

fn expand_env(value: &mut toml::Value) -> Result<(), ConfigError> {
    match value {
        toml::Value::String(s) if s.contains("${") => {
            *s = expand_str(s)?;
        }
        toml::Value::Array(items) => {
            for item in items {
                expand_env(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_env(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn expand_str(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference, keep literally
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnv(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

//! Configuration management for netpilot
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/netpilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{NetpilotError, Result};

/// Main configuration for netpilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Model selection and sampling
    #[serde(default)]
    pub model: ModelConfig,
    /// Agent loop behavior
    #[serde(default)]
    pub agent: AgentConfig,
    /// Sandbox capability grants and limits
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Device access
    #[serde(default)]
    pub devices: DeviceConfig,
    /// Delegated web-search agent
    #[serde(default)]
    pub search: SearchConfig,
    /// Log/span output
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model driving every agent loop
    /// Default: qwen2.5
    pub name: String,
    /// Sampling temperature for action selection
    pub temperature: f32,
    /// Context window passed to Ollama
    pub num_ctx: u32,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum steps before the loop gives up
    /// Default: 10
    pub max_steps: usize,
    /// Attempts per model call before the run fails
    pub model_retries: u32,
    /// Base delay between model call attempts in ms
    pub retry_backoff_ms: u64,
    /// Whether to show debug output
    pub debug: bool,
    /// Extra instructions appended to the system prompt
    pub system_prompt: Option<String>,
}

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Modules generated code may import in addition to the base set
    pub authorized_imports: Vec<String>,
    /// Default per-call tool timeout in seconds
    pub tool_timeout_secs: u64,
    /// Wall-clock limit for one code block in seconds
    pub code_timeout_secs: u64,
    /// Maximum evaluated operations per code block
    pub max_operations: usize,
    /// Directory `read_file`/`write_file` are confined to; unset = no file access
    pub file_root: Option<PathBuf>,
}

/// Device access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// JSON file mapping host -> {username, password}
    pub hosts_file: PathBuf,
    /// Device type used when a tool call omits one
    pub device_type: String,
    /// SSH port
    pub ssh_port: u16,
    /// Seconds to wait for the SSH handshake
    pub connect_timeout_secs: u64,
}

/// Delegated search agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Whether the manager agent gets a `search` sub-agent
    pub enabled: bool,
    /// Step budget of the search sub-agent
    pub max_steps: usize,
    /// DuckDuckGo HTML endpoint
    pub endpoint: String,
    /// Results returned per query
    pub max_results: usize,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `tracing` filter directive used when RUST_LOG is unset
    pub filter: String,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 300,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: env::var("NETPILOT_MODEL").unwrap_or_else(|_| "qwen2.5".to_string()),
            temperature: 0.1,
            num_ctx: 8192,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: env::var("NETPILOT_MAX_STEPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            model_retries: 3,
            retry_backoff_ms: 500,
            debug: env_flag("NETPILOT_DEBUG", false),
            system_prompt: None,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            authorized_imports: ["ncclient", "netmiko", "requests", "paramiko", "io"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tool_timeout_secs: 60,
            code_timeout_secs: 300,
            max_operations: 100_000,
            file_root: None,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hosts_file: env::var("NETPILOT_HOSTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("hosts.json")),
            device_type: "cisco_ios".to_string(),
            ssh_port: 22,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: env_flag("NETPILOT_SEARCH", false),
            max_steps: 2,
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            max_results: 5,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "netpilot=info".to_string(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netpilot")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(NetpilotError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| NetpilotError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NetpilotError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                NetpilotError::config(format!("Failed to create config dir: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| NetpilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| NetpilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Default per-call tool timeout
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox.tool_timeout_secs)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.devices.device_type, "cisco_ios");
        assert!(config.sandbox.file_root.is_none());
        assert!(config
            .sandbox
            .authorized_imports
            .contains(&"netmiko".to_string()));
    }

    #[test]
    fn test_ollama_url() {
        let mut config = Config::default();
        config.ollama.host = "localhost".to_string();
        config.ollama.port = 11434;
        assert_eq!(config.ollama_url(), "http://localhost:11434");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [agent]
            max_steps = 4
            model_retries = 2
            retry_backoff_ms = 10
            debug = false

            [sandbox]
            authorized_imports = ["netmiko"]
            tool_timeout_secs = 5
            code_timeout_secs = 30
            max_operations = 1000
            file_root = "/tmp/netpilot"
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.max_steps, 4);
        assert_eq!(config.sandbox.authorized_imports, vec!["netmiko"]);
        assert_eq!(
            config.sandbox.file_root,
            Some(PathBuf::from("/tmp/netpilot"))
        );
        assert_eq!(config.search.max_results, 5);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = Config::from_toml("[agent\nmax_steps = ").unwrap_err();
        assert!(matches!(err, NetpilotError::Config(_)));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = Config::default_config_toml();
        assert!(toml_str.contains("max_steps"));
        assert!(toml_str.contains("authorized_imports"));
    }
}

use crate::error::{McprocError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Declarative description of how to launch one supervised server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDefinition {
    /// Server name (unique identifier, case-sensitive, no whitespace)
    pub name: String,

    /// Executable name or path
    pub command: String,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables, merged over the inherited environment
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for the server
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Whether to automatically restart on crash
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,

    /// Free-text description, display only
    #[serde(default)]
    pub description: String,
}

fn default_auto_restart() -> bool {
    true
}

impl ServerDefinition {
    /// Validate the definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(McprocError::MissingConfigField("name".to_string()));
        }

        if self.name.chars().any(char::is_whitespace) {
            return Err(McprocError::ConfigValidationError(format!(
                "Server name must not contain whitespace: '{}'",
                self.name
            )));
        }

        if self.command.is_empty() {
            return Err(McprocError::MissingConfigField("command".to_string()));
        }

        if let Some(ref dir) = self.working_dir {
            if !dir.exists() {
                return Err(McprocError::ConfigValidationError(format!(
                    "Working directory does not exist: {}",
                    dir.display()
                )));
            }
            if !dir.is_dir() {
                return Err(McprocError::ConfigValidationError(format!(
                    "Working directory is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Expand environment variables in configuration fields
    fn expand_env_vars(&mut self) {
        self.command = expand_env_in_string(&self.command);

        if let Some(ref dir) = self.working_dir {
            self.working_dir = Some(expand_env_in_path(dir));
        }

        self.args = self.args.iter().map(|arg| expand_env_in_string(arg)).collect();

        self.env = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_in_string(v)))
            .collect();
    }
}

/// Expand environment variables in a string ($VAR and ${VAR} syntax)
fn expand_env_in_string(s: &str) -> String {
    let mut result = s.to_string();

    for (key, value) in std::env::vars() {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}

/// Per-instance supervision policy (not global, so tests can shrink it)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Maximum number of automatic restart attempts after a crash
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,

    /// Delay before an automatic restart (in milliseconds)
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Timeout before a graceful stop escalates to a forced kill (in milliseconds)
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_restart_delay_ms() -> u64 {
    5000
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_restart_attempts: default_max_restart_attempts(),
            restart_delay_ms: default_restart_delay_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl SupervisorSettings {
    /// Get the restart delay as a Duration
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Get the stop timeout as a Duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Declarative configuration file: server definitions plus supervision policy
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub servers: Vec<ServerDefinition>,

    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

impl ConfigFile {
    /// Load a configuration file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| McprocError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config: ConfigFile = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| McprocError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| McprocError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(McprocError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        if config.servers.is_empty() {
            return Err(McprocError::InvalidConfig(
                "No server definitions found in file".to_string(),
            ));
        }

        for definition in &mut config.servers {
            definition.expand_env_vars();
        }

        let mut seen = HashSet::new();
        for definition in &config.servers {
            definition.validate()?;
            if !seen.insert(definition.name.as_str()) {
                return Err(McprocError::ConfigValidationError(format!(
                    "Duplicate server name: {}",
                    definition.name
                )));
            }
        }

        Ok(config)
    }
}

//! Configuration file loading and management
//!
//! This module handles loading and parsing the daemon configuration from
//! `$XDG_CONFIG_HOME/modhost/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use plugin_sys::{LoadPolicy, PolicyRule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Host process configuration
    #[serde(default)]
    pub host: HostConfig,
    /// Load policy rules, first match wins
    #[serde(default, rename = "policy")]
    pub policies: Vec<PolicyRule>,
}

/// Host process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Directory scanned for `.smx` plugins
    /// Default: "plugins"
    pub plugins_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
    /// Interval between host ticks in milliseconds
    /// Default: 100
    pub tick_interval_ms: u64,
    /// Extensions reported as running
    pub extensions: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from("plugins"),
            log_level: "info".to_string(),
            tick_interval_ms: 100,
            extensions: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/modhost/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "raibid-labs", "modhost")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    pub fn default_config_content() -> &'static str {
        r#"# modhost Daemon Configuration

[host]
# Directory scanned for .smx plugins; relative paths resolve against the
# working directory
plugins_dir = "plugins"

# Log level: trace, debug, info, warn, error
log_level = "info"

# Interval between host ticks in milliseconds
tick_interval_ms = 100

# Extensions the host reports as running
extensions = []

# Load policy rules. The first rule whose pattern matches a plugin path
# applies. Patterns match trailing path segments; the file name may use
# '*' wildcards and may omit the .smx extension.
#
# [[policy]]
# pattern = "fun/*"
# block_load = true
#
# [[policy]]
# pattern = "admin*"
# reload = "never"            # never | level_change | level_change_if_updated
# debug = false
"#
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are valid and within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.host.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.host.log_level,
                valid_log_levels.join(", ")
            );
        }

        if self.host.tick_interval_ms == 0 {
            anyhow::bail!("host.tick_interval_ms must be greater than 0");
        }

        for (index, rule) in self.policies.iter().enumerate() {
            if rule.pattern.is_empty() {
                anyhow::bail!("Policy rule {}: pattern must not be empty", index + 1);
            }
            if rule.pattern.ends_with('/') || rule.pattern.ends_with('\\') {
                anyhow::bail!(
                    "Policy rule {}: pattern '{}' ends with a path separator",
                    index + 1,
                    rule.pattern
                );
            }
        }

        Ok(())
    }

    pub fn log_level(&self) -> Level {
        Level::from_str(&self.host.log_level).unwrap_or(Level::INFO)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.host.tick_interval_ms)
    }

    pub fn load_policy(&self) -> LoadPolicy {
        LoadPolicy::new(self.policies.clone())
    }
}

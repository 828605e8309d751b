//! Load policy rules matched against plugin paths.

use crate::alias::alias_match;
use serde::{Deserialize, Serialize};

/// When the hot-reload scan on level change touches a plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Never unloaded by the scan.
    Never,
    /// Unloaded on every level change.
    LevelChange,
    /// Unloaded on level change when the file changed on disk.
    #[default]
    LevelChangeIfUpdated,
}

impl ReloadPolicy {
    pub fn description(&self) -> &'static str {
        match self {
            ReloadPolicy::Never => "Never",
            ReloadPolicy::LevelChange => "Level Change",
            ReloadPolicy::LevelChangeIfUpdated => "Level Change if Updated",
        }
    }
}

/// A single policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Alias pattern, see [`alias_match`].
    pub pattern: String,

    /// Never load matching plugins.
    #[serde(default)]
    pub block_load: bool,

    #[serde(default)]
    pub reload: ReloadPolicy,

    /// Compile matching plugins with debugging enabled.
    #[serde(default)]
    pub debug: bool,
}

impl PolicyRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            block_load: false,
            reload: ReloadPolicy::default(),
            debug: false,
        }
    }
}

/// Ordered policy rules; the first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadPolicy {
    pub rules: Vec<PolicyRule>,
}

impl LoadPolicy {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// First rule whose pattern matches `path`.
    pub fn lookup(&self, path: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|rule| alias_match(&rule.pattern, path))
    }

    pub fn is_blocked(&self, path: &str) -> bool {
        self.lookup(path).map(|rule| rule.block_load).unwrap_or(false)
    }
}

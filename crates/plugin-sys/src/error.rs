//! Error types for the plugin system.

use script_runtime::RuntimeError;
use thiserror::Error;

/// Errors returned by administrative registry operations.
///
/// Failures of individual plugins during batch loads are never returned
/// as errors; they are recorded on the plugin as status and message.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("There is a global plugin loading lock in effect")]
    LoadLocked,

    #[error("Plugin {0} is blocked from loading by load policy")]
    Blocked(String),

    #[error("Plugin {0} is not loaded")]
    NotLoaded(String),

    #[error("Plugin index {0} not found")]
    IndexNotFound(usize),

    #[error("Plugin {path} failed to load: {reason}")]
    LoadFailed { path: String, reason: String },

    /// The plugin is executing; the unload was queued for the next tick.
    #[error("Plugin {0} is executing; unload deferred to the next tick")]
    Deferred(String),

    #[error("Usage: {0}")]
    Usage(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result type for plugin system operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

//! Error types for the script runtime.

use thiserror::Error;

/// Errors that can occur while compiling or executing a plugin.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Plugin file not found at the specified path.
    #[error("Unable to open file: {0}")]
    FileNotFound(String),

    /// The file exists but is not a readable plugin image.
    #[error("Invalid plugin image: {0}")]
    InvalidImage(String),

    /// The image was read but cannot be turned into a context.
    #[error("Compile error: {0}")]
    Compile(String),

    /// A function was called that the plugin does not define.
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// A native was invoked while its import slot was unbound.
    #[error("Native \"{0}\" is not bound")]
    NativeNotBound(String),

    /// The context is paused and refuses to execute.
    #[error("Plugin is paused")]
    Paused,

    /// Plugin execution failed.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

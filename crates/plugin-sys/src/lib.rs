//! # plugin-sys
//!
//! Plugin lifecycle management for modhost.
//!
//! This crate owns every loaded plugin and keeps the relationships between
//! them consistent. It provides:
//!
//! - [`PluginRegistry`]: two-pass loading, unloading, reloading and the
//!   hot-reload scan
//! - Native and library rebinding when providers come and go
//! - Load policy rules matched with [`alias_match`]
//! - Lifecycle listeners and the `plugins` administrative console
//!
//! Plugins are compiled by a [`script_runtime::Compiler`]; the registry
//! never looks inside a plugin beyond the
//! [`ExecutableContext`](script_runtime::ExecutableContext) seam.

pub mod alias;
pub mod console;
pub mod error;
pub mod host;
pub mod listener;
pub mod plugin;
pub mod policy;
mod rebind;
pub mod registry;

pub use alias::alias_match;
pub use console::{run_console, ConsoleCommand};
pub use error::{PluginError, PluginResult};
pub use host::{HostServices, StaticHost};
pub use listener::{ListenerId, PluginsListener};
pub use plugin::{Plugin, PluginProperty, PluginSerial, PluginStatus};
pub use policy::{LoadPolicy, PolicyRule, ReloadPolicy};
pub use registry::{console_file_name, LoadOutcome, PluginRegistry};

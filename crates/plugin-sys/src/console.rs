//! Administrative console for the plugin registry.
//!
//! Handles the `plugins` command family. Output is a list of
//! human-readable lines; the caller decides where they go.

use crate::error::{PluginError, PluginResult};
use crate::registry::{console_file_name, LoadOutcome, PluginRegistry};
use chrono::{DateTime, Local};

const PREFIX: &str = "[plugins]";

const MENU: &[(&str, &str)] = &[
    ("info", "Information about a plugin"),
    ("list", "Show loaded plugins"),
    ("load", "Load a plugin"),
    ("load_lock", "Prevents any more plugins from being loaded"),
    ("load_unlock", "Re-enables plugin loading"),
    ("refresh", "Reloads/refreshes all plugins in the plugins folder"),
    ("reload", "Reloads a plugin"),
    ("unload", "Unload a plugin"),
    ("unload_all", "Unloads all plugins"),
];

/// A parsed `plugins` subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Load(String),
    Unload(String),
    UnloadAll,
    Reload(String),
    Info(String),
    Refresh,
    LoadLock,
    LoadUnlock,
    /// No subcommand given; show the menu.
    Menu,
}

fn one_arg(parts: &[&str], usage: &str) -> PluginResult<String> {
    match parts {
        [_, arg] => Ok(arg.to_string()),
        _ => Err(PluginError::Usage(format!("plugins {}", usage))),
    }
}

fn no_args(parts: &[&str], command: ConsoleCommand) -> PluginResult<ConsoleCommand> {
    if parts.len() > 1 {
        return Err(PluginError::Usage(format!("plugins {}", parts[0])));
    }
    Ok(command)
}

impl ConsoleCommand {
    /// Parse the arguments following `plugins`.
    ///
    /// ```
    /// use plugin_sys::ConsoleCommand;
    ///
    /// assert_eq!(ConsoleCommand::parse("list").unwrap(), ConsoleCommand::List);
    /// assert_eq!(
    ///     ConsoleCommand::parse("unload 3").unwrap(),
    ///     ConsoleCommand::Unload("3".to_string())
    /// );
    /// ```
    pub fn parse(input: &str) -> PluginResult<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();

        let Some(first) = parts.first() else {
            return Ok(ConsoleCommand::Menu);
        };

        match first.to_lowercase().as_str() {
            "list" => no_args(&parts, ConsoleCommand::List),
            "load" => one_arg(&parts, "load <file>").map(ConsoleCommand::Load),
            "unload" => one_arg(&parts, "unload <#|file>").map(ConsoleCommand::Unload),
            "unload_all" => no_args(&parts, ConsoleCommand::UnloadAll),
            "reload" => one_arg(&parts, "reload <#|file>").map(ConsoleCommand::Reload),
            "info" => one_arg(&parts, "info <#>").map(ConsoleCommand::Info),
            "refresh" => no_args(&parts, ConsoleCommand::Refresh),
            "load_lock" => no_args(&parts, ConsoleCommand::LoadLock),
            "load_unlock" => no_args(&parts, ConsoleCommand::LoadUnlock),
            other => Err(PluginError::UnknownCommand(other.to_string())),
        }
    }

    /// Run the command against `registry`.
    pub fn execute(&self, registry: &mut PluginRegistry) -> Vec<String> {
        match self {
            ConsoleCommand::List => list(registry),
            ConsoleCommand::Load(arg) => load(registry, arg),
            ConsoleCommand::Unload(arg) => unload(registry, arg),
            ConsoleCommand::UnloadAll => {
                registry.unload_all();
                vec![format!("{} All plugins have been unloaded.", PREFIX)]
            }
            ConsoleCommand::Reload(arg) => reload(registry, arg),
            ConsoleCommand::Info(arg) => info(registry, arg),
            ConsoleCommand::Refresh => match registry.on_level_change() {
                Ok(_) => vec![format!(
                    "{} The plugin list has been refreshed and reloaded.",
                    PREFIX
                )],
                Err(e) => vec![format!("{} Plugin refresh failed: {}", PREFIX, e)],
            },
            ConsoleCommand::LoadLock => {
                if registry.set_loading_locked(true) {
                    vec![format!("{} There is already a loading lock in effect.", PREFIX)]
                } else {
                    vec![format!(
                        "{} Loading is now locked; no plugins will be loaded or re-loaded.",
                        PREFIX
                    )]
                }
            }
            ConsoleCommand::LoadUnlock => {
                if registry.set_loading_locked(false) {
                    vec![format!("{} The loading lock is no longer in effect.", PREFIX)]
                } else {
                    vec![format!("{} There was no loading lock in effect.", PREFIX)]
                }
            }
            ConsoleCommand::Menu => menu(),
        }
    }
}

/// Parse and execute one console line; parse errors print usage or the menu.
pub fn run_console(registry: &mut PluginRegistry, input: &str) -> Vec<String> {
    match ConsoleCommand::parse(input) {
        Ok(command) => command.execute(registry),
        Err(PluginError::Usage(usage)) => vec![format!("{} Usage: {}", PREFIX, usage)],
        Err(_) => menu(),
    }
}

fn menu() -> Vec<String> {
    let mut lines = vec![format!("{} Plugin Commands:", PREFIX)];
    lines.extend(
        MENU.iter()
            .map(|(name, help)| format!("    {:<12} - {}", name, help)),
    );
    lines
}

fn list(registry: &PluginRegistry) -> Vec<String> {
    if registry.is_empty() {
        return vec![format!("{} No plugins loaded", PREFIX)];
    }

    let mut lines = vec![format!(
        "{} Listing {} plugin(s):",
        PREFIX,
        registry.len()
    )];
    for (order, plugin) in registry.iter().enumerate() {
        let mut row = format!("  {:02}", order + 1);
        if plugin.is_silently_failed() {
            row.push_str(" Disabled:");
        } else if !plugin.is_runnable() {
            row.push_str(&format!(" <{}>", plugin.status()));
        }
        row.push_str(&format!(" \"{}\"", plugin.title()));
        if let Some(info) = plugin.info() {
            if !info.version.is_empty() {
                row.push_str(&format!(" ({})", info.version));
            }
            if !info.author.is_empty() {
                row.push_str(&format!(" by {}", info.author));
            }
        }
        lines.push(row);
    }

    let errors: Vec<String> = registry
        .iter()
        .filter(|p| !p.is_silently_failed())
        .filter_map(|p| p.error_message().map(|msg| format!("{}: {}", p.path(), msg)))
        .collect();
    if !errors.is_empty() {
        lines.push("Load Errors:".to_string());
        lines.extend(errors);
    }
    lines
}

fn load(registry: &mut PluginRegistry, arg: &str) -> Vec<String> {
    let file = console_file_name(arg);
    let line = match registry.load_plugin(&file) {
        Ok(LoadOutcome::Loaded(_)) => format!("{} Loaded plugin {} successfully.", PREFIX, file),
        Ok(LoadOutcome::AlreadyLoaded(_)) => {
            format!("{} Plugin {} is already loaded.", PREFIX, file)
        }
        Err(PluginError::LoadFailed { reason, .. }) => {
            format!("{} Plugin {} failed to load: {}.", PREFIX, file, reason)
        }
        Err(PluginError::Blocked(_)) => format!(
            "{} Plugin {} failed to load: This plugin is blocked from loading.",
            PREFIX, file
        ),
        Err(e) => format!("{} Plugin {} failed to load: {}.", PREFIX, file, e),
    };
    vec![line]
}

/// Map a lookup failure to its console line.
fn lookup_error(error: PluginError) -> Vec<String> {
    let line = match error {
        PluginError::IndexNotFound(order) => {
            format!("{} Plugin index {} not found.", PREFIX, order)
        }
        PluginError::NotLoaded(file) => format!("{} Plugin {} is not loaded.", PREFIX, file),
        other => format!("{} {}", PREFIX, other),
    };
    vec![line]
}

fn unload(registry: &mut PluginRegistry, arg: &str) -> Vec<String> {
    let serial = match registry.find_by_console_arg(arg) {
        Ok(serial) => serial,
        Err(e) => return lookup_error(e),
    };
    let title = registry
        .get(serial)
        .map(|p| p.title().to_string())
        .unwrap_or_default();

    let line = match registry.unload_plugin(serial) {
        Ok(()) => format!("{} Plugin {} unloaded successfully.", PREFIX, title),
        Err(PluginError::Deferred(_)) => format!(
            "{} Plugin {} is running code; it will be unloaded on the next tick.",
            PREFIX, title
        ),
        Err(_) => format!("{} Failed to unload plugin {}.", PREFIX, title),
    };
    vec![line]
}

fn reload(registry: &mut PluginRegistry, arg: &str) -> Vec<String> {
    let serial = match registry.find_by_console_arg(arg) {
        Ok(serial) => serial,
        Err(e) => return lookup_error(e),
    };
    let title = registry
        .get(serial)
        .map(|p| p.title().to_string())
        .unwrap_or_default();

    let line = match registry.reload_plugin(serial) {
        Ok(new_serial) => {
            let title = registry
                .get(new_serial)
                .map(|p| p.title().to_string())
                .unwrap_or(title);
            format!("{} Plugin {} reloaded successfully.", PREFIX, title)
        }
        Err(e) => format!("{} Failed to reload plugin {}: {}", PREFIX, title, e),
    };
    vec![line]
}

fn info(registry: &PluginRegistry, arg: &str) -> Vec<String> {
    let serial = match registry.find_by_console_arg(arg) {
        Ok(serial) => serial,
        Err(e) => return lookup_error(e),
    };
    let Some(plugin) = registry.get(serial) else {
        return vec![format!("{} Plugin {} is not loaded.", PREFIX, arg)];
    };

    let mut lines = vec![format!("  Filename: {}", plugin.path())];
    if let Some(info) = plugin.info() {
        if !info.name.is_empty() {
            if info.description.is_empty() {
                lines.push(format!("  Title: {}", info.name));
            } else {
                lines.push(format!("  Title: {} ({})", info.name, info.description));
            }
        }
        for (label, value) in [
            ("Author", &info.author),
            ("Version", &info.version),
            ("URL", &info.url),
            ("Timestamp", &info.timestamp),
        ] {
            if !value.is_empty() {
                lines.push(format!("  {}: {}", label, value));
            }
        }
    }

    match plugin.error_message() {
        Some(message) if !plugin.is_runnable() => {
            lines.push(format!("  Status: {}", plugin.status()));
            lines.push(format!("  Load error: {}", message));
        }
        _ => lines.push(format!("  Status: {}", plugin.status())),
    }

    lines.push(format!("  Reloads: {}", plugin.reload_policy().description()));

    if let Some(modified) = plugin.file_timestamp() {
        let modified: DateTime<Local> = modified.into();
        lines.push(format!(
            "  File modified: {}",
            modified.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    let dependents: Vec<&str> = plugin
        .dependents()
        .iter()
        .filter_map(|serial| registry.get(*serial).map(|p| p.path()))
        .collect();
    if !dependents.is_empty() {
        lines.push(format!("  Dependents: {}", dependents.join(", ")));
    }

    if plugin.is_debugging() {
        lines.push("  Debugging: enabled".to_string());
    }
    lines
}

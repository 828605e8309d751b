//! Line commands read from the daemon's standard input.
//!
//! - `plugins <subcommand ...>` runs the plugin console
//! - `changelevel` simulates a level change (hot-reload scan and rescan)
//! - `quit` stops the daemon

use plugin_sys::{run_console, PluginRegistry};

/// What the daemon should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Print these lines and keep running.
    Output(Vec<String>),
    Quit,
}

/// Handle one input line.
pub fn dispatch(registry: &mut PluginRegistry, line: &str) -> Directive {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command.to_lowercase().as_str() {
        "" => Directive::Output(Vec::new()),
        "quit" | "exit" => Directive::Quit,
        "plugins" | "sm" => Directive::Output(run_console(registry, rest)),
        "changelevel" => {
            let line = match registry.on_level_change() {
                Ok(running) => format!("[host] Level changed, {} plugin(s) running", running),
                Err(e) => format!("[host] Level change failed: {}", e),
            };
            Directive::Output(vec![line])
        }
        other => Directive::Output(vec![format!("Unknown command: {}", other)]),
    }
}

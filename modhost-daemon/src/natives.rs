//! Host-implemented natives and the lifecycle log listener.

use plugin_sys::{Plugin, PluginRegistry, PluginsListener};
use script_runtime::{native_fn, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Register the natives every plugin may import.
///
/// - `GetEngineTime`: whole seconds since `started`
/// - `PrintToServer`: log the arguments as one line
pub fn register_core_natives(registry: &mut PluginRegistry, started: Instant) {
    let natives = [
        (
            "GetEngineTime",
            native_fn(move |_| Ok(Value::Int(started.elapsed().as_secs() as i64))),
        ),
        (
            "PrintToServer",
            native_fn(|args| {
                let line: Vec<String> = args.iter().map(value_text).collect();
                info!(target: "plugins", "{}", line.join(" "));
                Ok(Value::Null)
            }),
        ),
    ];

    for (name, func) in natives {
        if !registry.register_core_native(name, func) {
            warn!("Core native {} registered twice", name);
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Str(s) => s.clone(),
    }
}

/// Logs plugin lifecycle events.
#[derive(Debug, Default)]
pub struct LogListener;

impl PluginsListener for LogListener {
    fn on_plugin_loaded(&mut self, plugin: &Plugin) {
        debug!(plugin = %plugin.path(), serial = %plugin.serial(), "Plugin resolved its dependencies");
    }

    fn on_plugin_unloaded(&mut self, plugin: &Plugin) {
        debug!(plugin = %plugin.path(), serial = %plugin.serial(), "Plugin unloading");
    }

    fn on_plugin_pause_change(&mut self, plugin: &Plugin, paused: bool) {
        if paused {
            info!(plugin = %plugin.path(), status = %plugin.status(), "Plugin paused");
        } else {
            info!(plugin = %plugin.path(), "Plugin resumed");
        }
    }
}

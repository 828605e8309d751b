//! Native binding and dependency cascades between plugins.
//!
//! When a provider goes away its consumers are pushed into `Error`; when a
//! provider (re)appears they are refreshed and may return to `Running`.

use crate::plugin::{PluginSerial, PluginStatus, CALLBACK_LIBRARY_ADDED, CALLBACK_LIBRARY_REMOVED};
use crate::registry::PluginRegistry;
use crate::listener::LifecycleEvent;
use script_runtime::{IdentityToken, NativeBinding, NativeFn, NativeOwner, NativeTable, Value};
use std::collections::HashMap;
use tracing::{info, warn};

/// What survivors need to know about an unloaded plugin.
pub(crate) struct DroppedPlugin {
    pub(crate) path: String,
    pub(crate) libraries: Vec<String>,
    pub(crate) identity: Option<IdentityToken>,
}

struct NativeExport {
    func: NativeFn,
    owner: IdentityToken,
    serial: PluginSerial,
}

/// Bind every unbound slot the host implements.
pub(crate) fn bind_core_natives(table: &mut NativeTable, core: &HashMap<String, NativeFn>) {
    for i in 0..table.len() {
        let func = match table.get(i) {
            Some(slot) if !slot.is_bound() => core.get(&slot.name).cloned(),
            _ => None,
        };
        if let Some(func) = func {
            table.bind(
                i,
                NativeBinding {
                    owner: NativeOwner::Core,
                    func,
                },
            );
        }
    }
}

impl PluginRegistry {
    /// Natives exported by plugins that passed their load decision.
    fn native_exports(&self) -> HashMap<String, NativeExport> {
        let mut exports = HashMap::new();
        for plugin in &self.plugins {
            if plugin.status() > PluginStatus::Loaded {
                continue;
            }
            let Some(owner) = plugin.identity() else {
                continue;
            };
            for (name, func) in &plugin.exported_natives {
                exports.entry(name.clone()).or_insert_with(|| NativeExport {
                    func: func.clone(),
                    owner,
                    serial: plugin.serial(),
                });
            }
        }
        exports
    }

    /// Fill the unbound slots of the plugin at `idx`.
    ///
    /// Core natives are always bound. Plugin exports are bound only outside
    /// the first pass; a required slot bound to an export makes this plugin
    /// a dependent of the exporter.
    pub(crate) fn bind_natives(&mut self, idx: usize, first_pass: bool) {
        let exports = if first_pass {
            HashMap::new()
        } else {
            self.native_exports()
        };

        let mut providers = Vec::new();
        if let Some(ctx) = self.plugins[idx].context.as_mut() {
            let table = ctx.natives_mut();
            bind_core_natives(table, &self.core_natives);

            for i in 0..table.len() {
                let Some(export) = table
                    .get(i)
                    .filter(|slot| !slot.is_bound())
                    .and_then(|slot| exports.get(&slot.name))
                else {
                    continue;
                };
                let optional = table.get(i).map(|slot| slot.optional).unwrap_or(false);
                let binding = NativeBinding {
                    owner: NativeOwner::Plugin(export.owner),
                    func: export.func.clone(),
                };
                if table.bind(i, binding) && !optional {
                    providers.push(export.serial);
                }
            }
        }

        let serial = self.plugins[idx].serial();
        for provider in providers {
            if let Some(p) = self.index_of(provider) {
                self.plugins[p].add_dependent(serial);
            }
        }
    }

    /// A newly started provider at `idx` offers its natives to everyone else.
    pub(crate) fn rebind_dependents(&mut self, idx: usize) {
        let Some(token) = self.plugins[idx].identity() else {
            return;
        };
        let natives = self.plugins[idx].exported_natives.clone();

        for other in 0..self.plugins.len() {
            if other == idx {
                continue;
            }
            let plugin = &self.plugins[other];
            let flagged = plugin.is_fake_natives_missing() || plugin.is_library_missing();
            if plugin.is_fake_natives_missing()
                || (plugin.status() == PluginStatus::Error && flagged)
            {
                self.try_refresh_dependencies(other);
            } else if plugin.is_runnable() {
                for (name, func) in &natives {
                    self.bind_native_into(other, idx, name, func.clone(), token);
                }
            }
        }
    }

    fn bind_native_into(
        &mut self,
        target: usize,
        provider: usize,
        name: &str,
        func: NativeFn,
        owner: IdentityToken,
    ) {
        let Some(ctx) = self.plugins[target].context.as_mut() else {
            return;
        };
        let table = ctx.natives_mut();
        let Some(slot) = table.find(name) else {
            return;
        };
        let optional = table.get(slot).map(|s| s.optional).unwrap_or(true);
        let binding = NativeBinding {
            owner: NativeOwner::Plugin(owner),
            func,
        };
        if table.bind(slot, binding) && !optional {
            let serial = self.plugins[target].serial();
            self.plugins[provider].add_dependent(serial);
        }
    }

    /// Rebind a plugin and bring it back to `Running` if nothing is missing.
    pub(crate) fn try_refresh_dependencies(&mut self, idx: usize) {
        self.bind_natives(idx, false);

        let missing_library = self.plugins[idx]
            .required_libraries
            .iter()
            .find(|lib| !self.plugins.iter().any(|p| p.provides_library(lib)))
            .cloned();
        if let Some(library) = missing_library {
            self.set_error_state_at(
                idx,
                PluginStatus::Error,
                format!("Library not found: {}", library),
            );
            return;
        }

        let missing_native = self.plugins[idx]
            .natives()
            .and_then(|table| table.unresolved().first().map(|name| name.to_string()));
        if let Some(native) = missing_native {
            self.set_error_state_at(
                idx,
                PluginStatus::Error,
                format!("Native not found: {}", native),
            );
            return;
        }

        let plugin = &mut self.plugins[idx];
        if plugin.status() != PluginStatus::Error {
            return;
        }
        plugin.status = PluginStatus::Running;
        plugin.library_missing = false;
        plugin.fake_natives_missing = false;
        plugin.error_message = None;
        if let Some(ctx) = plugin.context.as_mut() {
            if ctx.is_paused() {
                ctx.set_paused(false);
            }
        }
        info!(plugin = %plugin.path(), "Dependencies restored, plugin running again");

        let serial = plugin.serial();
        let libraries = plugin.provided_libraries.clone();
        self.listeners
            .notify(&self.plugins[idx], LifecycleEvent::PauseChange(false));
        for library in &libraries {
            self.broadcast_library(library, true, Some(serial));
        }
    }

    /// Record that the plugin at `idx` lost a provider.
    pub(crate) fn dependency_dropped(&mut self, idx: usize, dropped: &DroppedPlugin) {
        let plugin = &mut self.plugins[idx];
        if plugin.context.is_none()
            || matches!(plugin.status(), PluginStatus::Failed | PluginStatus::BadLoad)
        {
            return;
        }

        if plugin
            .required_libraries
            .iter()
            .any(|lib| dropped.libraries.contains(lib))
        {
            plugin.library_missing = true;
        }

        if let (Some(token), Some(ctx)) = (dropped.identity, plugin.context.as_mut()) {
            if ctx.natives_mut().unbind_owned_by(token) > 0 {
                plugin.fake_natives_missing = true;
            }
        }

        if plugin.is_library_missing() || plugin.is_fake_natives_missing() {
            let message = format!("Depends on plugin: {}", dropped.path);
            self.set_error_state_at(idx, PluginStatus::Error, message);
        }
    }

    /// Move a plugin into a failure status.
    ///
    /// A running plugin first retracts its libraries and is reported to
    /// listeners as paused.
    pub(crate) fn set_error_state_at(
        &mut self,
        idx: usize,
        status: PluginStatus,
        message: impl Into<String>,
    ) {
        let was_running = self.plugins[idx].status() == PluginStatus::Running;
        let message = message.into();
        warn!(plugin = %self.plugins[idx].path(), status = %status, "{}", message);

        if was_running {
            let serial = self.plugins[idx].serial();
            for library in self.plugins[idx].provided_libraries.clone() {
                self.broadcast_library(&library, false, Some(serial));
            }
        }

        self.plugins[idx].set_error_state(status, message);

        if was_running {
            self.listeners
                .notify(&self.plugins[idx], LifecycleEvent::PauseChange(true));
        }
    }

    /// Tell running plugins that optionally depend on `library` about it.
    pub(crate) fn broadcast_library(
        &mut self,
        library: &str,
        added: bool,
        exclude: Option<PluginSerial>,
    ) {
        let callback = if added {
            CALLBACK_LIBRARY_ADDED
        } else {
            CALLBACK_LIBRARY_REMOVED
        };
        let args = [Value::Str(library.to_string())];
        for plugin in &mut self.plugins {
            if Some(plugin.serial()) == exclude
                || plugin.status() != PluginStatus::Running
                || !plugin.wants_library_notice(library)
            {
                continue;
            }
            if let Some(Err(err)) = plugin.call(callback, &args) {
                warn!(plugin = %plugin.path(), library, "{} failed: {}", callback, err);
            }
        }
    }
}

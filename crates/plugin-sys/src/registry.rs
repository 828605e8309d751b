//! Plugin registry for managing loaded plugins.
//!
//! The registry owns every [`Plugin`], indexes them by path and drives the
//! load protocol. Loading happens in two passes: the first pass compiles a
//! plugin and lets it declare what it offers, the second pass resolves
//! what it needs. A directory scan runs the first pass for every file
//! before any second pass, so plugins may depend on plugins scanned after
//! them. A late single load runs both passes back to back.

use crate::error::{PluginError, PluginResult};
use crate::host::HostServices;
use crate::listener::{LifecycleEvent, ListenerId, Listeners, PluginsListener};
use crate::plugin::{
    Plugin, PluginSerial, PluginStatus, CALLBACK_ALL_PLUGINS_LOADED, CALLBACK_PAUSE_CHANGE,
    CALLBACK_PLUGIN_END, CALLBACK_PLUGIN_START,
};
use crate::policy::{LoadPolicy, ReloadPolicy};
use crate::rebind::{bind_core_natives, DroppedPlugin};
use script_runtime::{
    discover_images, AskLoadOutcome, CompileOptions, Compiler, IdentityToken, LoadRegistrar,
    NativeFn, Value,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Result of a successful administrative load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(PluginSerial),
    /// The path was already loaded and healthy; nothing was done.
    AlreadyLoaded(PluginSerial),
}

impl LoadOutcome {
    pub fn serial(self) -> PluginSerial {
        match self {
            LoadOutcome::Loaded(serial) | LoadOutcome::AlreadyLoaded(serial) => serial,
        }
    }
}

/// Result of the first load pass.
enum FirstPass {
    Loaded(Plugin),
    Failed(Plugin),
    SilentlyFailed(Plugin),
    AlreadyLoaded(PluginSerial),
    NeverLoad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeferredCommand {
    Unload(String),
}

/// Append `.smx` to console arguments that carry no extension.
pub fn console_file_name(arg: &str) -> String {
    if Path::new(arg).extension().is_some() {
        arg.to_string()
    } else {
        format!("{}.smx", arg)
    }
}

fn file_timestamp(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Registry for managing plugins.
pub struct PluginRegistry {
    /// Live plugins in display order.
    pub(crate) plugins: Vec<Plugin>,
    path_index: HashMap<String, PluginSerial>,
    next_serial: u64,
    pub(crate) listeners: Listeners,
    compiler: Box<dyn Compiler>,
    host: Box<dyn HostServices>,
    /// Host-implemented natives, bound in the first pass.
    pub(crate) core_natives: HashMap<String, NativeFn>,
    policy: LoadPolicy,
    plugins_dir: PathBuf,
    loading_locked: bool,
    all_plugins_loaded: bool,
    deferred: VecDeque<DeferredCommand>,
}

impl PluginRegistry {
    /// Create an empty registry loading plugins from `plugins_dir`.
    pub fn new(
        plugins_dir: impl Into<PathBuf>,
        compiler: Box<dyn Compiler>,
        host: Box<dyn HostServices>,
    ) -> Self {
        Self {
            plugins: Vec::new(),
            path_index: HashMap::new(),
            next_serial: 0,
            listeners: Listeners::default(),
            compiler,
            host,
            core_natives: HashMap::new(),
            policy: LoadPolicy::default(),
            plugins_dir: plugins_dir.into(),
            loading_locked: false,
            all_plugins_loaded: false,
            deferred: VecDeque::new(),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn policy(&self) -> &LoadPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: LoadPolicy) {
        self.policy = policy;
    }

    /// Register a host-implemented native. Returns false if the name is taken.
    pub fn register_core_native(&mut self, name: impl Into<String>, func: NativeFn) -> bool {
        let name = name.into();
        if self.core_natives.contains_key(&name) {
            return false;
        }
        self.core_natives.insert(name, func);
        true
    }

    pub fn add_listener(&mut self, listener: Box<dyn PluginsListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn is_loading_locked(&self) -> bool {
        self.loading_locked
    }

    /// Set the global load lock, returning the previous value.
    pub fn set_loading_locked(&mut self, locked: bool) -> bool {
        std::mem::replace(&mut self.loading_locked, locked)
    }

    /// True once the initial directory scan completed its second pass.
    pub fn all_plugins_loaded(&self) -> bool {
        self.all_plugins_loaded
    }

    /// Get the number of tracked plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    pub fn get(&self, serial: PluginSerial) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.serial() == serial)
    }

    pub fn get_mut(&mut self, serial: PluginSerial) -> Option<&mut Plugin> {
        self.plugins.iter_mut().find(|p| p.serial() == serial)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&Plugin> {
        self.path_index.get(path).and_then(|serial| self.get(*serial))
    }

    /// Plugin at 1-based display position `order`.
    pub fn plugin_by_order(&self, order: usize) -> Option<&Plugin> {
        order.checked_sub(1).and_then(|idx| self.plugins.get(idx))
    }

    /// 1-based display position of a plugin.
    pub fn order_of(&self, serial: PluginSerial) -> Option<usize> {
        self.index_of(serial).map(|idx| idx + 1)
    }

    pub fn plugin_by_identity(&self, identity: IdentityToken) -> Option<&Plugin> {
        self.plugins
            .iter()
            .find(|p| p.identity() == Some(identity))
    }

    /// Resolve a console argument: a 1-based index or a file name.
    pub fn find_by_console_arg(&self, arg: &str) -> PluginResult<PluginSerial> {
        if let Ok(order) = arg.parse::<usize>() {
            return self
                .plugin_by_order(order)
                .map(|p| p.serial())
                .ok_or(PluginError::IndexNotFound(order));
        }
        let file = console_file_name(arg);
        self.find_by_path(&file)
            .map(|p| p.serial())
            .ok_or(PluginError::NotLoaded(file))
    }

    /// Whether a running plugin provides `library`.
    pub fn library_exists(&self, library: &str) -> bool {
        self.plugins
            .iter()
            .any(|p| p.status() == PluginStatus::Running && p.provides_library(library))
    }

    /// Number of commands waiting for the next tick.
    pub fn pending_commands(&self) -> usize {
        self.deferred.len()
    }

    pub(crate) fn index_of(&self, serial: PluginSerial) -> Option<usize> {
        self.plugins.iter().position(|p| p.serial() == serial)
    }

    fn next_serial(&mut self) -> PluginSerial {
        self.next_serial += 1;
        PluginSerial(self.next_serial)
    }

    fn taken_native_names(&self) -> HashSet<String> {
        self.core_natives
            .keys()
            .cloned()
            .chain(
                self.plugins
                    .iter()
                    .flat_map(|p| p.exported_native_names().map(str::to_string)),
            )
            .collect()
    }

    /// Load every plugin file in the plugins directory.
    ///
    /// Individual failures are recorded on the plugins and logged. Returns
    /// the number of runnable plugins afterwards.
    pub fn load_all(&mut self) -> PluginResult<usize> {
        let files = discover_images(&self.plugins_dir)?;
        for file in &files {
            self.load_auto_plugin(file);
        }

        let pending: Vec<PluginSerial> = self
            .plugins
            .iter()
            .filter(|p| p.status() == PluginStatus::Loaded)
            .map(|p| p.serial())
            .collect();
        for serial in pending {
            let Some(idx) = self.index_of(serial) else {
                continue;
            };
            if self.plugins[idx].status() != PluginStatus::Loaded {
                continue;
            }
            if let Err(reason) = self.run_second_pass(serial) {
                self.set_error_state_at(idx, PluginStatus::Failed, reason);
            }
        }

        self.all_plugins_loaded = true;

        let serials: Vec<PluginSerial> = self.plugins.iter().map(|p| p.serial()).collect();
        for serial in serials {
            self.call_all_plugins_loaded(serial);
        }

        let runnable = self.plugins.iter().filter(|p| p.is_runnable()).count();
        info!(
            "Scanned {} plugin files, {} plugins running",
            files.len(),
            runnable
        );
        Ok(runnable)
    }

    /// Load a single plugin on request.
    ///
    /// After the initial scan this runs both passes; a plugin failing its
    /// second pass is unloaded again.
    pub fn load_plugin(&mut self, path: &str) -> PluginResult<LoadOutcome> {
        let serial = match self.first_pass(path) {
            FirstPass::NeverLoad => {
                return Err(if self.loading_locked {
                    PluginError::LoadLocked
                } else {
                    PluginError::Blocked(path.to_string())
                });
            }
            FirstPass::AlreadyLoaded(serial) => return Ok(LoadOutcome::AlreadyLoaded(serial)),
            FirstPass::Failed(plugin) => {
                let reason = plugin.error_message().unwrap_or("Unknown error").to_string();
                warn!(plugin = %path, "Failed to load plugin: {}", reason);
                return Err(PluginError::LoadFailed {
                    path: path.to_string(),
                    reason,
                });
            }
            FirstPass::Loaded(plugin) | FirstPass::SilentlyFailed(plugin) => {
                self.add_plugin(plugin)
            }
        };

        let loaded = self.get(serial).map(|p| p.status()) == Some(PluginStatus::Loaded);
        if self.all_plugins_loaded && loaded {
            if let Err(reason) = self.run_second_pass(serial) {
                warn!(plugin = %path, "Unable to load plugin: {}", reason);
                if let Err(e) = self.unload_plugin(serial) {
                    debug!(plugin = %path, "Cleanup after failed load: {}", e);
                }
                return Err(PluginError::LoadFailed {
                    path: path.to_string(),
                    reason,
                });
            }
            self.call_all_plugins_loaded(serial);
        }

        info!(plugin = %path, serial = %serial, "Loaded plugin");
        Ok(LoadOutcome::Loaded(serial))
    }

    /// Batch first pass: every outcome except a refusal is tracked.
    fn load_auto_plugin(&mut self, path: &str) {
        match self.first_pass(path) {
            FirstPass::Loaded(plugin) | FirstPass::SilentlyFailed(plugin) => {
                self.add_plugin(plugin);
            }
            FirstPass::Failed(plugin) => {
                warn!(
                    plugin = %path,
                    "Failed to load plugin: {}",
                    plugin.error_message().unwrap_or("Unknown error")
                );
                self.add_plugin(plugin);
            }
            FirstPass::AlreadyLoaded(_) | FirstPass::NeverLoad => {}
        }
    }

    fn add_plugin(&mut self, plugin: Plugin) -> PluginSerial {
        self.listeners.notify(&plugin, LifecycleEvent::Created);
        let serial = plugin.serial();
        self.path_index.insert(plugin.path().to_string(), serial);
        self.plugins.push(plugin);
        serial
    }

    fn first_pass(&mut self, path: &str) -> FirstPass {
        if self.loading_locked {
            return FirstPass::NeverLoad;
        }
        let rule = self.policy.lookup(path).cloned();
        if rule.as_ref().map(|r| r.block_load).unwrap_or(false) {
            debug!(plugin = %path, "Blocked by load policy");
            return FirstPass::NeverLoad;
        }

        if let Some(serial) = self.path_index.get(path).copied() {
            let stale = self
                .get(serial)
                .map(|p| {
                    matches!(
                        p.status(),
                        PluginStatus::BadLoad | PluginStatus::Error | PluginStatus::Failed
                    )
                })
                .unwrap_or(false);
            if !stale {
                return FirstPass::AlreadyLoaded(serial);
            }
            if let Err(e) = self.unload_plugin(serial) {
                debug!(plugin = %path, "Stale plugin stays loaded: {}", e);
                return FirstPass::AlreadyLoaded(serial);
            }
        }

        let mut plugin = Plugin::new(path, self.next_serial());
        let options = CompileOptions {
            debug: rule.as_ref().map(|r| r.debug).unwrap_or(false),
        };
        if let Some(rule) = &rule {
            plugin.reload_policy = rule.reload;
        }

        let full_path = self.plugins_dir.join(path);
        plugin.file_timestamp = file_timestamp(&full_path);

        let mut ctx = match self.compiler.compile(&full_path, &options) {
            Ok(ctx) => ctx,
            Err(e) => {
                plugin.set_error_state(
                    PluginStatus::BadLoad,
                    format!("Unable to load plugin ({})", e),
                );
                return FirstPass::Failed(plugin);
            }
        };

        bind_core_natives(ctx.natives_mut(), &self.core_natives);
        plugin.identity = Some(IdentityToken::mint());
        plugin.status = PluginStatus::Created;

        let mut registrar = LoadRegistrar::new(self.taken_native_names());
        let outcome = ctx
            .ask_plugin_load(self.all_plugins_loaded, &mut registrar)
            .unwrap_or_else(|e| AskLoadOutcome::Failure(e.to_string()));
        let extensions = ctx.extensions().to_vec();
        plugin.context = Some(ctx);

        match outcome {
            AskLoadOutcome::Success => {
                let items = registrar.into_registrations();
                plugin.provided_libraries = items.libraries;
                plugin.exported_natives = items.natives;
                for config in items.configs {
                    plugin.add_config(config);
                }
                plugin.status = PluginStatus::Loaded;

                for ext in extensions.iter().filter(|ext| ext.autoload) {
                    if !self.host.load_auto_extension(&ext.file, ext.required) {
                        debug!(plugin = %path, extension = %ext.name, "Autoload extension not running");
                    }
                }
                FirstPass::Loaded(plugin)
            }
            AskLoadOutcome::Failure(message) => {
                plugin.set_error_state(PluginStatus::Failed, message);
                FirstPass::Failed(plugin)
            }
            AskLoadOutcome::SilentFailure(message) => {
                plugin.set_error_state(PluginStatus::Failed, message);
                plugin.silently_failed = true;
                FirstPass::SilentlyFailed(plugin)
            }
        }
    }

    /// Resolve the dependencies of a `Loaded` plugin and start it.
    fn run_second_pass(&mut self, serial: PluginSerial) -> Result<(), String> {
        let idx = self
            .index_of(serial)
            .ok_or_else(|| format!("Plugin {} is not tracked", serial))?;
        let identity = self.plugins[idx].identity();

        for ext in self.plugins[idx].declared_extensions() {
            if ext.required {
                if !self.host.is_extension_running(&ext.name, &ext.file) {
                    return Err(format!(
                        "Required extension \"{}\" file(\"{}\") not running",
                        ext.name, ext.file
                    ));
                }
                if let Some(token) = identity {
                    self.host.bind_child_plugin(&ext.name, token);
                }
            } else {
                let callback = format!("__ext_{}_SetNTVOptional", ext.name);
                if let Some(Err(err)) = self.plugins[idx].call(&callback, &[]) {
                    warn!(plugin = %self.plugins[idx].path(), "{} failed: {}", callback, err);
                    return Err("Fatal error during plugin initialization (ext req)".to_string());
                }
            }
        }

        let own_file = self.plugins[idx].file_name().to_string();
        for dep in self.plugins[idx].declared_dependencies() {
            if dep.file == own_file {
                continue;
            }
            if !dep.required {
                let callback = format!("__pl_{}_SetNTVOptional", dep.name);
                if let Some(Err(err)) = self.plugins[idx].call(&callback, &[]) {
                    warn!(plugin = %self.plugins[idx].path(), "{} failed: {}", callback, err);
                    return Err("Fatal error during initializing plugin load".to_string());
                }
                continue;
            }
            if !self.plugins[idx].add_required_library(&dep.name) {
                continue;
            }
            match self.plugins.iter().position(|p| p.provides_library(&dep.name)) {
                Some(provider) => self.plugins[provider].add_dependent(serial),
                None => return Err(format!("Could not find required plugin \"{}\"", dep.name)),
            }
        }

        self.bind_natives(idx, false);

        let unresolved = self.plugins[idx]
            .natives()
            .and_then(|table| table.unresolved().first().map(|name| name.to_string()));
        if let Some(name) = unresolved {
            return Err(format!("Native \"{}\" was not found", name));
        }

        self.listeners
            .notify(&self.plugins[idx], LifecycleEvent::Loaded);
        self.call_plugin_start(idx);

        let plugin = &self.plugins[idx];
        let offers =
            !plugin.exported_natives.is_empty() || !plugin.provided_libraries.is_empty();
        if plugin.is_runnable() && offers {
            self.rebind_dependents(idx);
        }

        if self.plugins[idx].status() == PluginStatus::Running {
            for library in self.plugins[idx].provided_libraries.clone() {
                self.broadcast_library(&library, true, Some(serial));
            }
        }

        Ok(())
    }

    fn call_plugin_start(&mut self, idx: usize) {
        let plugin = &mut self.plugins[idx];
        if plugin.status != PluginStatus::Loaded {
            return;
        }
        plugin.status = PluginStatus::Running;
        if let Some(Err(err)) = plugin.call(CALLBACK_PLUGIN_START, &[]) {
            warn!(plugin = %plugin.path(), "{} failed: {}", CALLBACK_PLUGIN_START, err);
            // Libraries were never announced, so nothing to retract.
            plugin.set_error_state(
                PluginStatus::Error,
                "Error detected in plugin startup (see error logs)",
            );
        }
    }

    fn call_all_plugins_loaded(&mut self, serial: PluginSerial) {
        let Some(plugin) = self.get_mut(serial) else {
            return;
        };
        if !plugin.is_runnable() || plugin.got_all_loaded {
            return;
        }
        plugin.got_all_loaded = true;
        if let Some(Err(err)) = plugin.call(CALLBACK_ALL_PLUGINS_LOADED, &[]) {
            warn!(plugin = %plugin.path(), "{} failed: {}", CALLBACK_ALL_PLUGINS_LOADED, err);
        }
    }

    /// Unload a plugin and cascade the loss to everything bound to it.
    ///
    /// A plugin that is currently executing cannot be torn down; its unload
    /// is queued for the next [`on_tick`](Self::on_tick) and
    /// [`PluginError::Deferred`] is returned.
    pub fn unload_plugin(&mut self, serial: PluginSerial) -> PluginResult<()> {
        let idx = self
            .index_of(serial)
            .ok_or_else(|| PluginError::NotLoaded(serial.to_string()))?;

        if self.plugins[idx].is_on_call_stack() {
            let path = self.plugins[idx].path().to_string();
            info!(plugin = %path, "Plugin is executing, unload deferred");
            self.deferred.push_back(DeferredCommand::Unload(path.clone()));
            return Err(PluginError::Deferred(path));
        }

        let mut plugin = self.plugins.remove(idx);
        self.path_index.remove(plugin.path());
        let status = plugin.status();

        if status == PluginStatus::Running {
            for library in &plugin.provided_libraries {
                self.broadcast_library(library, false, None);
            }
        }

        let dropped = DroppedPlugin {
            path: plugin.path().to_string(),
            libraries: plugin.provided_libraries.clone(),
            identity: plugin.identity(),
        };
        for i in 0..self.plugins.len() {
            self.dependency_dropped(i, &dropped);
        }

        if status <= PluginStatus::Error {
            self.listeners.notify(&plugin, LifecycleEvent::Unloaded);
        }

        if status.is_runnable() {
            if let Some(ctx) = plugin.context.as_mut() {
                ctx.set_paused(false);
            }
            if let Some(Err(err)) = plugin.call(CALLBACK_PLUGIN_END, &[]) {
                warn!(plugin = %plugin.path(), "{} failed: {}", CALLBACK_PLUGIN_END, err);
            }
        }

        if let Some(token) = plugin.identity() {
            for other in &mut self.plugins {
                if let Some(ctx) = other.context.as_mut() {
                    ctx.natives_mut().unbind_owned_by(token);
                }
                other.remove_dependent(serial);
            }
        }

        self.listeners.notify(&plugin, LifecycleEvent::Destroyed);
        info!(plugin = %plugin.path(), serial = %serial, "Unloaded plugin");
        Ok(())
    }

    /// Unload every plugin.
    pub fn unload_all(&mut self) {
        let serials: Vec<PluginSerial> = self.plugins.iter().map(|p| p.serial()).collect();
        for serial in serials {
            if let Err(e) = self.unload_plugin(serial) {
                warn!(serial = %serial, "Unload failed: {}", e);
            }
        }
    }

    /// Unload and load a plugin again, keeping its display position.
    pub fn reload_plugin(&mut self, serial: PluginSerial) -> PluginResult<PluginSerial> {
        if self.loading_locked {
            return Err(PluginError::LoadLocked);
        }
        let position = self
            .index_of(serial)
            .ok_or_else(|| PluginError::NotLoaded(serial.to_string()))?;
        let path = self.plugins[position].path().to_string();

        self.unload_plugin(serial)?;
        let new_serial = self.load_plugin(&path)?.serial();

        if let Some(current) = self.index_of(new_serial) {
            let plugin = self.plugins.remove(current);
            let position = position.min(self.plugins.len());
            self.plugins.insert(position, plugin);
        }

        info!(plugin = %path, serial = %new_serial, "Reloaded plugin");
        Ok(new_serial)
    }

    /// Hot-reload scan: unload plugins whose reload policy says so.
    ///
    /// Returns the number of plugins unloaded. Does nothing while loading
    /// is locked.
    pub fn reload_or_unload_plugins(&mut self) -> usize {
        if self.loading_locked {
            return 0;
        }

        let snapshot: Vec<(PluginSerial, ReloadPolicy, String)> = self
            .plugins
            .iter()
            .map(|p| (p.serial(), p.reload_policy(), p.path().to_string()))
            .collect();

        let mut unloaded = 0;
        for (serial, policy, path) in snapshot {
            let unload = match policy {
                ReloadPolicy::Never => false,
                ReloadPolicy::LevelChange => true,
                ReloadPolicy::LevelChangeIfUpdated => {
                    let current = file_timestamp(&self.plugins_dir.join(&path));
                    let Some(plugin) = self.get_mut(serial) else {
                        continue;
                    };
                    let changed = current.is_none() || current != plugin.file_timestamp;
                    if changed {
                        plugin.file_timestamp = current;
                    }
                    changed
                }
            };
            if !unload {
                continue;
            }
            match self.unload_plugin(serial) {
                Ok(()) => unloaded += 1,
                Err(e) => debug!(plugin = %path, "Hot reload unload skipped: {}", e),
            }
        }
        unloaded
    }

    /// Level change: hot-reload scan followed by a directory scan.
    pub fn on_level_change(&mut self) -> PluginResult<usize> {
        if self.loading_locked {
            info!("Loading is locked, skipping plugin refresh");
            return Ok(self.plugins.iter().filter(|p| p.is_runnable()).count());
        }
        let unloaded = self.reload_or_unload_plugins();
        debug!("Hot reload unloaded {} plugins", unloaded);
        self.load_all()
    }

    /// Run commands deferred from the previous tick.
    pub fn on_tick(&mut self) {
        let pending: Vec<DeferredCommand> = self.deferred.drain(..).collect();
        for command in pending {
            match command {
                DeferredCommand::Unload(path) => {
                    let Some(serial) = self.path_index.get(&path).copied() else {
                        continue;
                    };
                    match self.unload_plugin(serial) {
                        Ok(()) | Err(PluginError::Deferred(_)) => {}
                        Err(e) => warn!(plugin = %path, "Deferred unload failed: {}", e),
                    }
                }
            }
        }
    }

    /// Pause or unpause a plugin.
    ///
    /// Only `Running -> Paused` and `Paused -> Running` are allowed.
    pub fn set_pause_state(&mut self, serial: PluginSerial, paused: bool) -> bool {
        let Some(idx) = self.index_of(serial) else {
            return false;
        };
        let expected = if paused {
            PluginStatus::Running
        } else {
            PluginStatus::Paused
        };
        if self.plugins[idx].status() != expected {
            return false;
        }

        let libraries = self.plugins[idx].provided_libraries.clone();
        if paused {
            for library in &libraries {
                self.broadcast_library(library, false, Some(serial));
            }
        }

        let plugin = &mut self.plugins[idx];
        let args = [Value::Bool(paused)];
        if paused {
            if let Some(Err(err)) = plugin.call(CALLBACK_PAUSE_CHANGE, &args) {
                warn!(plugin = %plugin.path(), "{} failed: {}", CALLBACK_PAUSE_CHANGE, err);
            }
            plugin.status = PluginStatus::Paused;
            if let Some(ctx) = plugin.context.as_mut() {
                ctx.set_paused(true);
            }
        } else {
            if let Some(ctx) = plugin.context.as_mut() {
                ctx.set_paused(false);
            }
            plugin.status = PluginStatus::Running;
            if let Some(Err(err)) = plugin.call(CALLBACK_PAUSE_CHANGE, &args) {
                warn!(plugin = %plugin.path(), "{} failed: {}", CALLBACK_PAUSE_CHANGE, err);
            }
        }

        self.listeners
            .notify(&self.plugins[idx], LifecycleEvent::PauseChange(paused));

        if !paused {
            for library in &libraries {
                self.broadcast_library(library, true, Some(serial));
            }
        }
        true
    }
}

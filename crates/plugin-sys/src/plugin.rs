//! A single plugin and its lifecycle state.
//!
//! Plugins are owned by the [`PluginRegistry`](crate::PluginRegistry). Other
//! parts of the system refer to them by [`PluginSerial`] or by identity
//! token, never by reference.

use crate::policy::ReloadPolicy;
use script_runtime::{
    AutoConfig, DeclaredDependency, DeclaredExtension, ExecutableContext, IdentityToken, NativeFn,
    NativeTable, PluginInfo, RuntimeResult, Value,
};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

pub const CALLBACK_PLUGIN_START: &str = "OnPluginStart";
pub const CALLBACK_PLUGIN_END: &str = "OnPluginEnd";
pub const CALLBACK_ALL_PLUGINS_LOADED: &str = "OnAllPluginsLoaded";
pub const CALLBACK_PAUSE_CHANGE: &str = "OnPluginPauseChange";
pub const CALLBACK_LIBRARY_ADDED: &str = "OnLibraryAdded";
pub const CALLBACK_LIBRARY_REMOVED: &str = "OnLibraryRemoved";

/// Stable id assigned when a plugin object is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginSerial(pub(crate) u64);

impl fmt::Display for PluginSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle status.
///
/// Variants are ordered from fully running to least initialized, so
/// `status <= Paused` means runnable and `status <= Error` means the
/// plugin got through its load decision at some point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginStatus {
    Running,
    Paused,
    /// A dependency was lost or never resolved; may recover.
    Error,
    /// Passed its load decision, waiting for dependency resolution.
    Loaded,
    /// Refused to load, or failed dependency resolution in a batch.
    Failed,
    /// Compiled, identity minted.
    Created,
    Uncompiled,
    /// File missing or failed to compile.
    BadLoad,
}

impl PluginStatus {
    pub fn is_runnable(self) -> bool {
        self <= PluginStatus::Paused
    }

    pub fn text(self) -> &'static str {
        match self {
            PluginStatus::Running => "Running",
            PluginStatus::Paused => "Paused",
            PluginStatus::Error => "Error",
            PluginStatus::Loaded => "Loaded",
            PluginStatus::Failed => "Failed",
            PluginStatus::Created => "Created",
            PluginStatus::Uncompiled => "Uncompiled",
            PluginStatus::BadLoad => "Bad Load",
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Data other subsystems attach to a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginProperty {
    Text(String),
    Int(i64),
    Flag(bool),
    /// Handles owned on the plugin's behalf.
    Handles(Vec<u64>),
}

/// One loaded (or loading) plugin.
pub struct Plugin {
    path: String,
    serial: PluginSerial,
    pub(crate) status: PluginStatus,
    pub(crate) silently_failed: bool,
    pub(crate) error_message: Option<String>,
    pub(crate) context: Option<Box<dyn ExecutableContext>>,
    pub(crate) identity: Option<IdentityToken>,
    pub(crate) provided_libraries: Vec<String>,
    pub(crate) required_libraries: Vec<String>,
    pub(crate) exported_natives: Vec<(String, NativeFn)>,
    pub(crate) dependents: Vec<PluginSerial>,
    pub(crate) file_timestamp: Option<SystemTime>,
    pub(crate) reload_policy: ReloadPolicy,
    pub(crate) library_missing: bool,
    pub(crate) fake_natives_missing: bool,
    pub(crate) got_all_loaded: bool,
    configs: Vec<AutoConfig>,
    properties: HashMap<String, PluginProperty>,
}

impl Plugin {
    pub(crate) fn new(path: impl Into<String>, serial: PluginSerial) -> Self {
        Self {
            path: path.into(),
            serial,
            status: PluginStatus::Uncompiled,
            silently_failed: false,
            error_message: None,
            context: None,
            identity: None,
            provided_libraries: Vec::new(),
            required_libraries: Vec::new(),
            exported_natives: Vec::new(),
            dependents: Vec::new(),
            file_timestamp: None,
            reload_policy: ReloadPolicy::default(),
            library_missing: false,
            fake_natives_missing: false,
            got_all_loaded: false,
            configs: Vec::new(),
            properties: HashMap::new(),
        }
    }

    /// Path relative to the plugins directory; unique per registry.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name without directories.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.path)
    }

    pub fn serial(&self) -> PluginSerial {
        self.serial
    }

    pub fn status(&self) -> PluginStatus {
        self.status
    }

    pub fn is_runnable(&self) -> bool {
        self.status.is_runnable()
    }

    /// The failure should not be shown to end users.
    pub fn is_silently_failed(&self) -> bool {
        self.silently_failed
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Present once the plugin compiled.
    pub fn identity(&self) -> Option<IdentityToken> {
        self.identity
    }

    pub fn info(&self) -> Option<&PluginInfo> {
        self.context.as_ref().map(|ctx| ctx.info())
    }

    /// Display name: the plugin's own title, or its path.
    pub fn title(&self) -> &str {
        match self.info() {
            Some(info) if !info.name.is_empty() => &info.name,
            _ => &self.path,
        }
    }

    pub fn natives(&self) -> Option<&NativeTable> {
        self.context.as_ref().map(|ctx| ctx.natives())
    }

    pub fn is_debugging(&self) -> bool {
        self.context.as_ref().map(|ctx| ctx.is_debugging()).unwrap_or(false)
    }

    pub fn provided_libraries(&self) -> &[String] {
        &self.provided_libraries
    }

    pub fn provides_library(&self, name: &str) -> bool {
        self.provided_libraries.iter().any(|lib| lib == name)
    }

    pub fn required_libraries(&self) -> &[String] {
        &self.required_libraries
    }

    /// Names of natives this plugin exports to others.
    pub fn exported_native_names(&self) -> impl Iterator<Item = &str> {
        self.exported_natives.iter().map(|(name, _)| name.as_str())
    }

    /// Plugins that bound one of our natives or required one of our libraries.
    pub fn dependents(&self) -> &[PluginSerial] {
        &self.dependents
    }

    pub fn file_timestamp(&self) -> Option<SystemTime> {
        self.file_timestamp
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        self.reload_policy
    }

    pub fn is_library_missing(&self) -> bool {
        self.library_missing
    }

    pub fn is_fake_natives_missing(&self) -> bool {
        self.fake_natives_missing
    }

    pub fn configs(&self) -> &[AutoConfig] {
        &self.configs
    }

    /// Add an auto-exec config unless an identical one exists.
    pub fn add_config(&mut self, config: AutoConfig) {
        if !self.configs.contains(&config) {
            self.configs.push(config);
        }
    }

    pub fn property(&self, key: &str) -> Option<&PluginProperty> {
        self.properties.get(key)
    }

    /// Attach a property. Refuses to overwrite an existing key.
    pub fn set_property(&mut self, key: impl Into<String>, value: PluginProperty) -> bool {
        let key = key.into();
        if self.properties.contains_key(&key) {
            return false;
        }
        self.properties.insert(key, value);
        true
    }

    /// Remove and return a property.
    pub fn take_property(&mut self, key: &str) -> Option<PluginProperty> {
        self.properties.remove(key)
    }

    pub fn is_on_call_stack(&self) -> bool {
        self.context
            .as_ref()
            .map(|ctx| ctx.is_on_call_stack())
            .unwrap_or(false)
    }

    pub(crate) fn declared_dependencies(&self) -> Vec<DeclaredDependency> {
        self.context
            .as_ref()
            .map(|ctx| ctx.dependencies().to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn declared_extensions(&self) -> Vec<DeclaredExtension> {
        self.context
            .as_ref()
            .map(|ctx| ctx.extensions().to_vec())
            .unwrap_or_default()
    }

    /// Whether the plugin declares an optional dependency on `library`.
    pub(crate) fn wants_library_notice(&self, library: &str) -> bool {
        self.context
            .as_ref()
            .map(|ctx| {
                ctx.dependencies()
                    .iter()
                    .any(|dep| !dep.required && dep.name == library)
            })
            .unwrap_or(false)
    }

    pub(crate) fn add_required_library(&mut self, name: &str) -> bool {
        if self.required_libraries.iter().any(|lib| lib == name) {
            return false;
        }
        self.required_libraries.push(name.to_string());
        true
    }

    pub(crate) fn add_dependent(&mut self, serial: PluginSerial) {
        if serial != self.serial && !self.dependents.contains(&serial) {
            self.dependents.push(serial);
        }
    }

    pub(crate) fn remove_dependent(&mut self, serial: PluginSerial) {
        self.dependents.retain(|dep| *dep != serial);
    }

    /// Run a public function if the plugin defines it.
    pub(crate) fn call(&mut self, name: &str, args: &[Value]) -> Option<RuntimeResult<Value>> {
        let ctx = self.context.as_mut()?;
        if !ctx.has_function(name) {
            return None;
        }
        Some(ctx.execute(name, args))
    }

    /// Store the failure and suspend the context for good.
    ///
    /// Pause broadcasts are the registry's job; see
    /// [`PluginRegistry`](crate::PluginRegistry).
    pub(crate) fn set_error_state(&mut self, status: PluginStatus, message: impl Into<String>) {
        self.status = status;
        self.error_message = Some(message.into());
        if let Some(ctx) = self.context.as_mut() {
            ctx.set_paused(true);
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("path", &self.path)
            .field("serial", &self.serial)
            .field("status", &self.status)
            .field("error_message", &self.error_message)
            .finish_non_exhaustive()
    }
}

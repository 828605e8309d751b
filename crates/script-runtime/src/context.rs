//! Executable contexts and the compiler seam.
//!
//! A [`Compiler`] turns a plugin file into a boxed [`ExecutableContext`].
//! The plugin system only ever talks to plugins through this trait.

use crate::error::RuntimeResult;
use crate::native::{NativeFn, NativeTable, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Descriptive metadata a plugin carries about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,
    pub url: String,
    /// Build date and time as recorded by the compiler.
    pub timestamp: String,
}

/// A plugin library the plugin depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    /// Library name.
    pub name: String,
    /// File the library usually lives in; a plugin never depends on itself.
    #[serde(default)]
    pub file: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

/// A host extension the plugin depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredExtension {
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub autoload: bool,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// Config file a plugin asks the host to execute (and maybe create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoConfig {
    #[serde(default = "default_true")]
    pub auto_create: bool,
    pub file_stem: String,
    #[serde(default)]
    pub folder: String,
}

/// Verdict of the plugin's load-decision callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskLoadOutcome {
    Success,
    Failure(String),
    /// Failure that should not be reported to end users.
    SilentFailure(String),
}

/// Options the host passes to the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub debug: bool,
}

/// Everything a plugin registered while deciding whether to load.
#[derive(Default)]
pub struct Registrations {
    pub libraries: Vec<String>,
    pub natives: Vec<(String, NativeFn)>,
    pub configs: Vec<AutoConfig>,
}

/// Host side of the load-decision callback.
///
/// The plugin registers the libraries it provides and the natives it
/// exports here. Native names already exported elsewhere are refused.
pub struct LoadRegistrar {
    taken: HashSet<String>,
    items: Registrations,
}

impl LoadRegistrar {
    /// `taken` holds every native name already exported by the host or by
    /// another plugin.
    pub fn new(taken: HashSet<String>) -> Self {
        Self {
            taken,
            items: Registrations::default(),
        }
    }

    pub fn register_library(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.items.libraries.contains(&name) {
            self.items.libraries.push(name);
        }
    }

    /// Export a native. Returns false if the name is already taken.
    pub fn create_native(&mut self, name: impl Into<String>, func: NativeFn) -> bool {
        let name = name.into();
        if !self.taken.insert(name.clone()) {
            return false;
        }
        self.items.natives.push((name, func));
        true
    }

    pub fn auto_exec_config(&mut self, config: AutoConfig) {
        self.items.configs.push(config);
    }

    pub fn into_registrations(self) -> Registrations {
        self.items
    }
}

/// A compiled plugin ready to execute.
pub trait ExecutableContext {
    fn info(&self) -> &PluginInfo;

    fn dependencies(&self) -> &[DeclaredDependency];

    fn extensions(&self) -> &[DeclaredExtension];

    /// Whether a public function with this name exists.
    fn has_function(&self, name: &str) -> bool;

    /// Run a public function to completion.
    fn execute(&mut self, name: &str, args: &[Value]) -> RuntimeResult<Value>;

    /// Run the plugin's load-decision callback.
    ///
    /// `late` is true when the plugin is loaded after the initial batch.
    fn ask_plugin_load(
        &mut self,
        late: bool,
        registrar: &mut LoadRegistrar,
    ) -> RuntimeResult<AskLoadOutcome>;

    fn natives(&self) -> &NativeTable;

    fn natives_mut(&mut self) -> &mut NativeTable;

    /// A paused context refuses to execute anything.
    fn set_paused(&mut self, paused: bool);

    fn is_paused(&self) -> bool;

    /// True while one of this context's functions is executing.
    fn is_on_call_stack(&self) -> bool;

    fn is_debugging(&self) -> bool {
        false
    }
}

/// Turns a plugin file into an executable context.
pub trait Compiler {
    fn compile(
        &self,
        path: &Path,
        options: &CompileOptions,
    ) -> RuntimeResult<Box<dyn ExecutableContext>>;
}

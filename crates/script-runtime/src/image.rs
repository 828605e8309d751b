//! Plugin image format and the reference compiler.
//!
//! A plugin image (.smx) is a small declarative program: metadata, the
//! natives it imports, a handful of public functions and the answer it
//! gives when asked whether it wants to load.
//!
//! ## Format
//!
//! ```text
//! +----------------+
//! | Magic (4 bytes)|  "SMX\x01" (optional)
//! +----------------+
//! | JSON body      |
//! +----------------+
//! ```
//!
//! Files without the magic prefix are read as plain JSON.

use crate::context::{
    AskLoadOutcome, AutoConfig, CompileOptions, Compiler, DeclaredDependency, DeclaredExtension,
    ExecutableContext, LoadRegistrar, PluginInfo,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::native::{native_fn, NativeTable, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Magic bytes for plugin images.
pub const MAGIC: &[u8; 4] = b"SMX\x01";

/// The only image version this compiler understands.
pub const IMAGE_VERSION: u8 = 1;

/// Parsed plugin image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginImage {
    pub version: u8,

    #[serde(default)]
    pub info: PluginInfo,

    /// Native imports, in slot order.
    #[serde(default)]
    pub natives: Vec<NativeImport>,

    #[serde(default)]
    pub functions: Vec<Function>,

    #[serde(default)]
    pub dependencies: Vec<DeclaredDependency>,

    #[serde(default)]
    pub extensions: Vec<DeclaredExtension>,

    /// Load decision; a missing section means the plugin always agrees.
    #[serde(default)]
    pub on_load: Option<OnLoad>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeImport {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

/// A public function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Invoke a native import; its result becomes the function's result.
    CallNative {
        native: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Flag a native import as optional at runtime.
    MarkOptional { native: String },
    /// Abort with a runtime error.
    Fault { message: String },
    /// Return a constant.
    Return { value: Value },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Success,
    Failure,
    SilentFailure,
}

/// What the plugin does when asked whether it wants to load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnLoad {
    pub decision: Decision,
    pub error: Option<String>,
    /// Refuse to load after the initial batch.
    pub refuse_late: bool,
    pub libraries: Vec<String>,
    pub natives: Vec<ExportedNative>,
    pub configs: Vec<AutoConfig>,
}

/// A native the plugin exports; it always answers with `returns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedNative {
    pub name: String,
    #[serde(default)]
    pub returns: Value,
}

impl PluginImage {
    /// Read an image from disk.
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read(path)?;
        Self::parse(&content)
    }

    /// Parse an image from bytes.
    pub fn parse(bytes: &[u8]) -> RuntimeResult<Self> {
        let body = bytes.strip_prefix(MAGIC.as_slice()).unwrap_or(bytes);

        let content = std::str::from_utf8(body)
            .map_err(|e| RuntimeError::InvalidImage(format!("Invalid UTF-8: {}", e)))?;

        serde_json::from_str(content)
            .map_err(|e| RuntimeError::InvalidImage(format!("Invalid image JSON: {}", e)))
    }

    /// Check the image can be turned into a context.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.version != IMAGE_VERSION {
            return Err(RuntimeError::Compile(format!(
                "Unsupported image version: {}",
                self.version
            )));
        }

        let mut seen = HashSet::new();
        for function in &self.functions {
            if !seen.insert(function.name.as_str()) {
                return Err(RuntimeError::Compile(format!(
                    "Duplicate function '{}'",
                    function.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for import in &self.natives {
            if !seen.insert(import.name.as_str()) {
                return Err(RuntimeError::Compile(format!(
                    "Duplicate native import '{}'",
                    import.name
                )));
            }
        }

        Ok(())
    }
}

/// Executable context backed by a [`PluginImage`].
pub struct ImageContext {
    image: PluginImage,
    natives: NativeTable,
    paused: bool,
    depth: usize,
    debug: bool,
}

impl ImageContext {
    pub fn new(image: PluginImage, debug: bool) -> Self {
        let natives = NativeTable::new(
            image
                .natives
                .iter()
                .map(|n| (n.name.clone(), n.optional)),
        );
        Self {
            image,
            natives,
            paused: false,
            depth: 0,
            debug,
        }
    }
}

fn run(body: &[Instruction], natives: &mut NativeTable) -> RuntimeResult<Value> {
    let mut result = Value::Null;
    for instruction in body {
        match instruction {
            Instruction::CallNative { native, args } => {
                result = natives.invoke(native, args)?;
            }
            Instruction::MarkOptional { native } => {
                natives.mark_optional(native);
            }
            Instruction::Fault { message } => {
                return Err(RuntimeError::ExecutionError(message.clone()));
            }
            Instruction::Return { value } => return Ok(value.clone()),
        }
    }
    Ok(result)
}

impl ExecutableContext for ImageContext {
    fn info(&self) -> &PluginInfo {
        &self.image.info
    }

    fn dependencies(&self) -> &[DeclaredDependency] {
        &self.image.dependencies
    }

    fn extensions(&self) -> &[DeclaredExtension] {
        &self.image.extensions
    }

    fn has_function(&self, name: &str) -> bool {
        self.image.functions.iter().any(|f| f.name == name)
    }

    fn execute(&mut self, name: &str, _args: &[Value]) -> RuntimeResult<Value> {
        if self.paused {
            return Err(RuntimeError::Paused);
        }
        let function = self
            .image
            .functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| RuntimeError::FunctionNotFound(name.to_string()))?;

        self.depth += 1;
        let result = run(&function.body, &mut self.natives);
        self.depth -= 1;
        result
    }

    fn ask_plugin_load(
        &mut self,
        late: bool,
        registrar: &mut LoadRegistrar,
    ) -> RuntimeResult<AskLoadOutcome> {
        let Some(on_load) = &self.image.on_load else {
            return Ok(AskLoadOutcome::Success);
        };

        if on_load.refuse_late && late {
            return Ok(AskLoadOutcome::Failure(
                "Plugin cannot be loaded late".to_string(),
            ));
        }

        for library in &on_load.libraries {
            registrar.register_library(library.clone());
        }
        for export in &on_load.natives {
            let returns = export.returns.clone();
            if !registrar.create_native(export.name.clone(), native_fn(move |_| Ok(returns.clone())))
            {
                return Err(RuntimeError::ExecutionError(format!(
                    "Native \"{}\" already exists",
                    export.name
                )));
            }
        }
        for config in &on_load.configs {
            registrar.auto_exec_config(config.clone());
        }

        let message = || {
            on_load
                .error
                .clone()
                .unwrap_or_else(|| "Plugin failed to load".to_string())
        };
        Ok(match on_load.decision {
            Decision::Success => AskLoadOutcome::Success,
            Decision::Failure => AskLoadOutcome::Failure(message()),
            Decision::SilentFailure => AskLoadOutcome::SilentFailure(message()),
        })
    }

    fn natives(&self) -> &NativeTable {
        &self.natives
    }

    fn natives_mut(&mut self) -> &mut NativeTable {
        &mut self.natives
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_on_call_stack(&self) -> bool {
        self.depth > 0
    }

    fn is_debugging(&self) -> bool {
        self.debug
    }
}

/// Compiles `.smx` images from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCompiler;

impl Compiler for ImageCompiler {
    fn compile(
        &self,
        path: &Path,
        options: &CompileOptions,
    ) -> RuntimeResult<Box<dyn ExecutableContext>> {
        if !path.is_file() {
            return Err(RuntimeError::FileNotFound(path.display().to_string()));
        }

        let image = PluginImage::load(path)?;
        image.validate()?;

        debug!(
            "Compiled {:?}: {} functions, {} natives",
            path,
            image.functions.len(),
            image.natives.len()
        );
        Ok(Box::new(ImageContext::new(image, options.debug)))
    }
}

//! # script-runtime
//!
//! Executable plugin contexts for modhost.
//!
//! This crate provides:
//! - The [`ExecutableContext`] and [`Compiler`] seams the plugin system
//!   talks to
//! - Native import tables and identity tokens
//! - A reference `.smx` image compiler
//! - Discovery of plugin files in a plugins directory
//!
//! ## Plugin Images
//!
//! An image is a JSON document, optionally prefixed with the `SMX\x01`
//! magic. See [`image`] for the format.

pub mod context;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod image;
pub mod native;

pub use context::{
    AskLoadOutcome, AutoConfig, CompileOptions, Compiler, DeclaredDependency, DeclaredExtension,
    ExecutableContext, LoadRegistrar, PluginInfo, Registrations,
};
pub use discovery::discover_images;
pub use error::{RuntimeError, RuntimeResult};
pub use identity::IdentityToken;
pub use image::{ImageCompiler, ImageContext, PluginImage};
pub use native::{native_fn, NativeBinding, NativeFn, NativeOwner, NativeSlot, NativeTable, Value};

//! Integration tests for plugin-sys.
//!
//! These tests cover:
//! - Two-pass loading and late single loads
//! - Cascading dependency loss and recovery
//! - Reload, hot-reload scan, load lock and load policy
//! - Deferred unloads, pausing, library notices and listeners
//! - The `plugins` console

use plugin_sys::{
    run_console, LoadOutcome, LoadPolicy, Plugin, PluginError, PluginRegistry, PluginSerial,
    PluginStatus, PluginsListener, PolicyRule, ReloadPolicy, StaticHost,
};
use script_runtime::{
    native_fn, AskLoadOutcome, CompileOptions, Compiler, DeclaredDependency, DeclaredExtension,
    ExecutableContext, ImageCompiler, LoadRegistrar, NativeFn, NativeTable, PluginInfo,
    RuntimeResult, Value,
};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

/// Write a plugin image below the plugins directory.
fn write_plugin(dir: &Path, name: &str, image: serde_json::Value) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, serde_json::to_vec_pretty(&image).unwrap()).unwrap();
}

fn simple_plugin(title: &str) -> serde_json::Value {
    json!({"version": 1, "info": {"name": title, "author": "tests", "version": "1.0"}})
}

/// `base.smx`: provides library `core` and exports `core_version`.
fn base_plugin() -> serde_json::Value {
    json!({
        "version": 1,
        "info": {"name": "Base"},
        "on_load": {
            "libraries": ["core"],
            "natives": [{"name": "core_version", "returns": 7}]
        }
    })
}

/// `addon.smx`: requires library `core` and imports `core_version`.
fn addon_plugin() -> serde_json::Value {
    json!({
        "version": 1,
        "info": {"name": "Addon"},
        "natives": [{"name": "core_version"}],
        "dependencies": [{"name": "core", "file": "base.smx"}],
        "functions": [
            {"name": "Version", "body": [{"op": "call_native", "native": "core_version"}]}
        ]
    })
}

fn new_registry(dir: &TempDir) -> PluginRegistry {
    PluginRegistry::new(
        dir.path(),
        Box::new(ImageCompiler),
        Box::new(StaticHost::default()),
    )
}

fn serial_of(registry: &PluginRegistry, path: &str) -> PluginSerial {
    registry.find_by_path(path).unwrap().serial()
}

fn status_of(registry: &PluginRegistry, path: &str) -> PluginStatus {
    registry.find_by_path(path).unwrap().status()
}

/// Core native appending its arguments to a shared log.
fn trace_native(log: &Rc<RefCell<Vec<Value>>>) -> NativeFn {
    let log = Rc::clone(log);
    native_fn(move |args| {
        log.borrow_mut().extend(args.iter().cloned());
        Ok(Value::Null)
    })
}

fn traced(log: &Rc<RefCell<Vec<Value>>>) -> Vec<String> {
    log.borrow()
        .iter()
        .map(|v| match v {
            Value::Str(s) => s.clone(),
            other => format!("{:?}", other),
        })
        .collect()
}

/// Listener recording every event as `event:path`.
struct Recorder(Rc<RefCell<Vec<String>>>);

impl PluginsListener for Recorder {
    fn on_plugin_created(&mut self, plugin: &Plugin) {
        self.0.borrow_mut().push(format!("created:{}", plugin.path()));
    }

    fn on_plugin_loaded(&mut self, plugin: &Plugin) {
        self.0.borrow_mut().push(format!("loaded:{}", plugin.path()));
    }

    fn on_plugin_unloaded(&mut self, plugin: &Plugin) {
        self.0.borrow_mut().push(format!("unloaded:{}", plugin.path()));
    }

    fn on_plugin_destroyed(&mut self, plugin: &Plugin) {
        self.0.borrow_mut().push(format!("destroyed:{}", plugin.path()));
    }

    fn on_plugin_pause_change(&mut self, plugin: &Plugin, paused: bool) {
        self.0
            .borrow_mut()
            .push(format!("pause:{}:{}", plugin.path(), paused));
    }
}

/// Context whose call-stack state is driven by the test.
struct BusyContext {
    inner: Box<dyn ExecutableContext>,
    busy: Rc<Cell<bool>>,
}

impl ExecutableContext for BusyContext {
    fn info(&self) -> &PluginInfo {
        self.inner.info()
    }

    fn dependencies(&self) -> &[DeclaredDependency] {
        self.inner.dependencies()
    }

    fn extensions(&self) -> &[DeclaredExtension] {
        self.inner.extensions()
    }

    fn has_function(&self, name: &str) -> bool {
        self.inner.has_function(name)
    }

    fn execute(&mut self, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        self.inner.execute(name, args)
    }

    fn ask_plugin_load(
        &mut self,
        late: bool,
        registrar: &mut LoadRegistrar,
    ) -> RuntimeResult<AskLoadOutcome> {
        self.inner.ask_plugin_load(late, registrar)
    }

    fn natives(&self) -> &NativeTable {
        self.inner.natives()
    }

    fn natives_mut(&mut self) -> &mut NativeTable {
        self.inner.natives_mut()
    }

    fn set_paused(&mut self, paused: bool) {
        self.inner.set_paused(paused)
    }

    fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    fn is_on_call_stack(&self) -> bool {
        self.busy.get()
    }
}

struct BusyCompiler {
    busy: Rc<Cell<bool>>,
}

impl Compiler for BusyCompiler {
    fn compile(
        &self,
        path: &Path,
        options: &CompileOptions,
    ) -> RuntimeResult<Box<dyn ExecutableContext>> {
        let inner = ImageCompiler.compile(path, options)?;
        Ok(Box::new(BusyContext {
            inner,
            busy: Rc::clone(&self.busy),
        }))
    }
}

// ==============================================================================
// Two-Pass Loading
// ==============================================================================

#[test]
fn test_batch_resolves_natives_across_scan_order() {
    let temp_dir = TempDir::new().unwrap();
    // a.smx is scanned before the plugin exporting what it needs.
    write_plugin(
        temp_dir.path(),
        "a.smx",
        json!({"version": 1, "natives": [{"name": "B_Get"}]}),
    );
    write_plugin(
        temp_dir.path(),
        "b.smx",
        json!({"version": 1, "on_load": {"natives": [{"name": "B_Get", "returns": 1}]}}),
    );

    let mut registry = new_registry(&temp_dir);
    assert_eq!(registry.load_all().unwrap(), 2);
    assert!(registry.all_plugins_loaded());

    assert_eq!(status_of(&registry, "a.smx"), PluginStatus::Running);
    assert_eq!(status_of(&registry, "b.smx"), PluginStatus::Running);

    let a = serial_of(&registry, "a.smx");
    let b = registry.find_by_path("b.smx").unwrap();
    assert_eq!(b.dependents(), [a]);
}

#[test]
fn test_required_library_needs_provider_in_batch() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "addon.smx", addon_plugin());

    let mut registry = new_registry(&temp_dir);
    assert_eq!(registry.load_all().unwrap(), 0);
    let addon = registry.find_by_path("addon.smx").unwrap();
    assert_eq!(addon.status(), PluginStatus::Failed);
    assert_eq!(
        addon.error_message(),
        Some("Could not find required plugin \"core\"")
    );

    // With the provider present the same scan order succeeds.
    write_plugin(temp_dir.path(), "base.smx", base_plugin());
    let mut registry = new_registry(&temp_dir);
    assert_eq!(registry.load_all().unwrap(), 2);
    let addon = registry.find_by_path("addon.smx").unwrap();
    assert_eq!(addon.status(), PluginStatus::Running);
    assert!(addon.natives().unwrap().get(0).unwrap().is_bound());
}

#[test]
fn test_late_consumer_waits_for_provider() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "a.smx",
        json!({"version": 1, "natives": [{"name": "B_Get"}]}),
    );

    let mut registry = new_registry(&temp_dir);
    assert_eq!(registry.load_all().unwrap(), 0);
    let a = registry.find_by_path("a.smx").unwrap();
    assert_eq!(a.status(), PluginStatus::Failed);
    assert_eq!(a.error_message(), Some("Native \"B_Get\" was not found"));

    write_plugin(
        temp_dir.path(),
        "b.smx",
        json!({"version": 1, "on_load": {"natives": [{"name": "B_Get", "returns": 1}]}}),
    );
    registry.load_plugin("b.smx").unwrap();
    // A failed plugin is not revived by a new provider.
    assert_eq!(status_of(&registry, "a.smx"), PluginStatus::Failed);

    // Loading the failed path again replaces it.
    let old = serial_of(&registry, "a.smx");
    let outcome = registry.load_plugin("a.smx").unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded(serial) if serial != old));
    assert_eq!(status_of(&registry, "a.smx"), PluginStatus::Running);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_late_load_with_missing_native_is_not_tracked() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "a.smx",
        json!({"version": 1, "natives": [{"name": "Missing"}]}),
    );

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();
    registry.unload_all();
    assert!(registry.is_empty());

    let err = registry.load_plugin("a.smx").unwrap_err();
    match err {
        PluginError::LoadFailed { path, reason } => {
            assert_eq!(path, "a.smx");
            assert_eq!(reason, "Native \"Missing\" was not found");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(registry.is_empty());
}

#[test]
fn test_optional_and_reserved_natives_never_fail() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "a.smx",
        json!({
            "version": 1,
            "natives": [
                {"name": "GetEngineTime"},
                {"name": "Maybe", "optional": true},
                {"name": "@runtime"}
            ]
        }),
    );

    let mut registry = new_registry(&temp_dir);
    registry.register_core_native("GetEngineTime", native_fn(|_| Ok(Value::Int(0))));
    registry.load_all().unwrap();

    assert_eq!(status_of(&registry, "a.smx"), PluginStatus::Running);
    let natives = registry.find_by_path("a.smx").unwrap().natives().unwrap();
    assert!(natives.get(0).unwrap().is_bound());
    assert!(!natives.get(1).unwrap().is_bound());
}

#[test]
fn test_load_decisions() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "refuse.smx",
        json!({"version": 1, "on_load": {"decision": "failure", "error": "Game not supported"}}),
    );
    write_plugin(
        temp_dir.path(),
        "quiet.smx",
        json!({"version": 1, "on_load": {"decision": "silent_failure"}}),
    );

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    let refuse = registry.find_by_path("refuse.smx").unwrap();
    assert_eq!(refuse.status(), PluginStatus::Failed);
    assert_eq!(refuse.error_message(), Some("Game not supported"));
    assert!(!refuse.is_silently_failed());

    let quiet = registry.find_by_path("quiet.smx").unwrap();
    assert_eq!(quiet.status(), PluginStatus::Failed);
    assert!(quiet.is_silently_failed());

    // A single load of a refusing plugin reports the plugin's message.
    registry.unload_all();
    let err = registry.load_plugin("refuse.smx").unwrap_err();
    assert!(err.to_string().contains("Game not supported"));
    assert!(registry.find_by_path("refuse.smx").is_none());

    // A silent failure is tracked and reported as a load.
    assert!(registry.load_plugin("quiet.smx").is_ok());
    assert!(registry.find_by_path("quiet.smx").unwrap().is_silently_failed());
}

#[test]
fn test_refuse_late_load() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "early.smx",
        json!({"version": 1, "on_load": {"refuse_late": true}}),
    );

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();
    assert_eq!(status_of(&registry, "early.smx"), PluginStatus::Running);

    let serial = serial_of(&registry, "early.smx");
    let err = registry.reload_plugin(serial).unwrap_err();
    assert!(err.to_string().contains("Plugin cannot be loaded late"));
    assert!(registry.is_empty());
}

#[test]
fn test_duplicate_native_export_fails_second_plugin() {
    let temp_dir = TempDir::new().unwrap();
    let exporter = json!({"version": 1, "on_load": {"natives": [{"name": "Shared"}]}});
    write_plugin(temp_dir.path(), "first.smx", exporter.clone());
    write_plugin(temp_dir.path(), "second.smx", exporter);

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    assert_eq!(status_of(&registry, "first.smx"), PluginStatus::Running);
    let second = registry.find_by_path("second.smx").unwrap();
    assert_eq!(second.status(), PluginStatus::Failed);
    assert!(second.error_message().unwrap().contains("already exists"));
}

#[test]
fn test_bad_files_are_tracked_in_batch() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("garbage.smx"), "not an image").unwrap();
    write_plugin(temp_dir.path(), "future.smx", json!({"version": 9}));

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    for path in ["garbage.smx", "future.smx"] {
        let plugin = registry.find_by_path(path).unwrap();
        assert_eq!(plugin.status(), PluginStatus::BadLoad);
        assert!(plugin.identity().is_none());
        assert!(plugin
            .error_message()
            .unwrap()
            .starts_with("Unable to load plugin ("));
    }
}

#[test]
fn test_required_extension() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "needs.smx",
        json!({
            "version": 1,
            "extensions": [{"name": "sdktools", "file": "sdktools.ext"}]
        }),
    );
    write_plugin(
        temp_dir.path(),
        "geo.smx",
        json!({
            "version": 1,
            "extensions": [{"name": "geoip", "file": "geoip.ext", "autoload": true}]
        }),
    );

    let mut registry = PluginRegistry::new(
        temp_dir.path(),
        Box::new(ImageCompiler),
        Box::new(StaticHost::new(["sdktools"])),
    );
    registry.load_all().unwrap();
    assert_eq!(status_of(&registry, "needs.smx"), PluginStatus::Running);

    let geo = registry.find_by_path("geo.smx").unwrap();
    assert_eq!(geo.status(), PluginStatus::Failed);
    assert_eq!(
        geo.error_message(),
        Some("Required extension \"geoip\" file(\"geoip.ext\") not running")
    );
}

#[test]
fn test_optional_extension_self_configures() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "geo.smx",
        json!({
            "version": 1,
            "natives": [{"name": "Geo_Lookup"}],
            "extensions": [{"name": "geoip", "file": "geoip.ext", "required": false}],
            "functions": [{"name": "__ext_geoip_SetNTVOptional", "body": [
                {"op": "mark_optional", "native": "Geo_Lookup"}
            ]}]
        }),
    );
    write_plugin(
        temp_dir.path(),
        "geo_strict.smx",
        json!({
            "version": 1,
            "extensions": [{"name": "geoip", "file": "geoip.ext", "required": false}],
            "functions": [{"name": "__ext_geoip_SetNTVOptional", "body": [
                {"op": "fault", "message": "cannot run without geoip"}
            ]}]
        }),
    );

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    let geo = registry.find_by_path("geo.smx").unwrap();
    assert_eq!(geo.status(), PluginStatus::Running);
    assert!(geo.error_message().is_none());
    assert!(!geo.natives().unwrap().get(0).unwrap().is_bound());

    let strict = registry.find_by_path("geo_strict.smx").unwrap();
    assert_eq!(strict.status(), PluginStatus::Failed);
    assert_eq!(
        strict.error_message(),
        Some("Fatal error during plugin initialization (ext req)")
    );
}

#[test]
fn test_optional_library_self_configures() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "stats.smx",
        json!({
            "version": 1,
            "natives": [{"name": "core_version"}],
            "dependencies": [{"name": "core", "required": false}],
            "functions": [{"name": "__pl_core_SetNTVOptional", "body": [
                {"op": "mark_optional", "native": "core_version"}
            ]}]
        }),
    );
    write_plugin(
        temp_dir.path(),
        "stats_strict.smx",
        json!({
            "version": 1,
            "dependencies": [{"name": "core", "required": false}],
            "functions": [{"name": "__pl_core_SetNTVOptional", "body": [
                {"op": "fault", "message": "core is mandatory here"}
            ]}]
        }),
    );

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    let stats = registry.find_by_path("stats.smx").unwrap();
    assert_eq!(stats.status(), PluginStatus::Running);
    assert!(stats.required_libraries().is_empty());
    assert!(!stats.natives().unwrap().get(0).unwrap().is_bound());

    let strict = registry.find_by_path("stats_strict.smx").unwrap();
    assert_eq!(strict.status(), PluginStatus::Failed);
    assert_eq!(
        strict.error_message(),
        Some("Fatal error during initializing plugin load")
    );
}

#[test]
fn test_all_plugins_loaded_delivered_once() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "a.smx",
        json!({
            "version": 1,
            "natives": [{"name": "Trace"}],
            "functions": [
                {"name": "OnPluginStart", "body": [
                    {"op": "call_native", "native": "Trace", "args": ["start"]}
                ]},
                {"name": "OnAllPluginsLoaded", "body": [
                    {"op": "call_native", "native": "Trace", "args": ["all"]}
                ]}
            ]
        }),
    );

    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = new_registry(&temp_dir);
    registry.register_core_native("Trace", trace_native(&log));

    registry.load_all().unwrap();
    registry.on_level_change().unwrap();

    assert_eq!(traced(&log), ["start", "all"]);
}

#[test]
fn test_plugin_start_fault() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "broken.smx",
        json!({
            "version": 1,
            "functions": [{"name": "OnPluginStart", "body": [{"op": "fault", "message": "boom"}]}]
        }),
    );

    let events = Rc::new(RefCell::new(Vec::new()));
    let mut registry = new_registry(&temp_dir);
    registry.add_listener(Box::new(Recorder(Rc::clone(&events))));
    registry.load_all().unwrap();

    let plugin = registry.find_by_path("broken.smx").unwrap();
    assert_eq!(plugin.status(), PluginStatus::Error);
    assert_eq!(
        plugin.error_message(),
        Some("Error detected in plugin startup (see error logs)")
    );
    assert_eq!(
        *events.borrow(),
        ["created:broken.smx", "loaded:broken.smx"]
    );
}

// ==============================================================================
// Cascades
// ==============================================================================

#[test]
fn test_unload_provider_cascades_and_recovers() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "addon.smx", addon_plugin());
    write_plugin(temp_dir.path(), "base.smx", base_plugin());

    let mut registry = new_registry(&temp_dir);
    assert_eq!(registry.load_all().unwrap(), 2);
    assert!(registry.library_exists("core"));

    let addon = registry.find_by_path("addon.smx").unwrap();
    assert_eq!(addon.required_libraries(), ["core".to_string()]);

    let base = serial_of(&registry, "base.smx");
    registry.unload_plugin(base).unwrap();
    assert!(!registry.library_exists("core"));

    let addon = registry.find_by_path("addon.smx").unwrap();
    assert_eq!(addon.status(), PluginStatus::Error);
    assert_eq!(addon.error_message(), Some("Depends on plugin: base.smx"));
    assert!(addon.is_library_missing());
    assert!(addon.is_fake_natives_missing());
    assert!(!addon.natives().unwrap().get(0).unwrap().is_bound());

    // Without the file the provider cannot come back.
    std::fs::remove_file(temp_dir.path().join("base.smx")).unwrap();
    assert!(matches!(
        registry.load_plugin("base.smx"),
        Err(PluginError::LoadFailed { .. })
    ));
    registry.on_tick();
    assert_eq!(status_of(&registry, "addon.smx"), PluginStatus::Error);

    write_plugin(temp_dir.path(), "base.smx", base_plugin());
    registry.load_plugin("base.smx").unwrap();

    let addon = registry.find_by_path("addon.smx").unwrap();
    assert_eq!(addon.status(), PluginStatus::Running);
    assert!(addon.error_message().is_none());
    assert!(!addon.is_library_missing());
    assert!(!addon.is_fake_natives_missing());
    assert!(addon.natives().unwrap().get(0).unwrap().is_bound());

    let addon = serial_of(&registry, "addon.smx");
    let base = registry.find_by_path("base.smx").unwrap();
    assert_eq!(base.dependents(), [addon]);
}

#[test]
fn test_unload_provider_cascades_into_optional_import() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "base.smx", base_plugin());
    write_plugin(
        temp_dir.path(),
        "opt.smx",
        json!({"version": 1, "natives": [{"name": "core_version", "optional": true}]}),
    );

    let mut registry = new_registry(&temp_dir);
    assert_eq!(registry.load_all().unwrap(), 2);
    let opt = registry.find_by_path("opt.smx").unwrap();
    assert!(opt.natives().unwrap().get(0).unwrap().is_bound());

    let base = serial_of(&registry, "base.smx");
    registry.unload_plugin(base).unwrap();

    let opt = registry.find_by_path("opt.smx").unwrap();
    assert_eq!(opt.status(), PluginStatus::Error);
    assert_eq!(opt.error_message(), Some("Depends on plugin: base.smx"));
    assert!(opt.is_fake_natives_missing());
    assert!(!opt.is_library_missing());
    assert!(!opt.natives().unwrap().get(0).unwrap().is_bound());

    registry.load_plugin("base.smx").unwrap();
    let opt = registry.find_by_path("opt.smx").unwrap();
    assert_eq!(opt.status(), PluginStatus::Running);
    assert!(!opt.is_fake_natives_missing());
    assert!(opt.natives().unwrap().get(0).unwrap().is_bound());
}

#[test]
fn test_unloading_consumer_releases_provider() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "addon.smx", addon_plugin());
    write_plugin(temp_dir.path(), "base.smx", base_plugin());

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    let addon = serial_of(&registry, "addon.smx");
    registry.unload_plugin(addon).unwrap();

    let base = registry.find_by_path("base.smx").unwrap();
    assert_eq!(base.status(), PluginStatus::Running);
    assert!(base.dependents().is_empty());
}

#[test]
fn test_pause_state() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "a.smx", simple_plugin("A"));

    let events = Rc::new(RefCell::new(Vec::new()));
    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();
    registry.add_listener(Box::new(Recorder(Rc::clone(&events))));

    let a = serial_of(&registry, "a.smx");
    assert!(!registry.set_pause_state(a, false));
    assert!(registry.set_pause_state(a, true));
    assert_eq!(status_of(&registry, "a.smx"), PluginStatus::Paused);
    assert!(!registry.set_pause_state(a, true));
    assert!(registry.set_pause_state(a, false));
    assert_eq!(status_of(&registry, "a.smx"), PluginStatus::Running);

    assert_eq!(*events.borrow(), ["pause:a.smx:true", "pause:a.smx:false"]);
}

#[test]
fn test_library_notices() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "base.smx", base_plugin());
    write_plugin(
        temp_dir.path(),
        "watcher.smx",
        json!({
            "version": 1,
            "natives": [{"name": "Trace"}],
            "dependencies": [{"name": "core", "required": false}],
            "functions": [
                {"name": "OnLibraryAdded", "body": [
                    {"op": "call_native", "native": "Trace", "args": ["added"]}
                ]},
                {"name": "OnLibraryRemoved", "body": [
                    {"op": "call_native", "native": "Trace", "args": ["removed"]}
                ]}
            ]
        }),
    );

    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = new_registry(&temp_dir);
    registry.register_core_native("Trace", trace_native(&log));
    registry.load_all().unwrap();
    assert_eq!(status_of(&registry, "watcher.smx"), PluginStatus::Running);

    let base = serial_of(&registry, "base.smx");
    registry.unload_plugin(base).unwrap();
    // An optional dependency never puts the watcher into Error.
    assert_eq!(status_of(&registry, "watcher.smx"), PluginStatus::Running);

    let base = registry.load_plugin("base.smx").unwrap().serial();
    assert!(registry.set_pause_state(base, true));
    assert!(registry.set_pause_state(base, false));

    assert_eq!(traced(&log), ["removed", "added", "removed", "added"]);
}

// ==============================================================================
// Reload, Hot Reload and Lifecycle
// ==============================================================================

#[test]
fn test_duplicate_load() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "a.smx", simple_plugin("A"));

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();
    let a = serial_of(&registry, "a.smx");

    assert_eq!(
        registry.load_plugin("a.smx").unwrap(),
        LoadOutcome::AlreadyLoaded(a)
    );
    assert_eq!(registry.load_all().unwrap(), 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_reload_keeps_position() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["a", "b", "c"] {
        write_plugin(temp_dir.path(), &format!("{}.smx", name), simple_plugin(name));
    }

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    let old = serial_of(&registry, "b.smx");
    let new = registry.reload_plugin(old).unwrap();
    assert_ne!(old, new);
    assert_eq!(registry.order_of(new), Some(2));
    assert!(registry.get(old).is_none());

    let paths: Vec<&str> = registry.iter().map(|p| p.path()).collect();
    assert_eq!(paths, ["a.smx", "b.smx", "c.smx"]);
}

#[test]
fn test_hot_reload_if_updated() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "a.smx", simple_plugin("A"));

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();
    let first = serial_of(&registry, "a.smx");

    registry.on_level_change().unwrap();
    assert_eq!(serial_of(&registry, "a.smx"), first);

    let file = std::fs::File::options()
        .write(true)
        .open(temp_dir.path().join("a.smx"))
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();

    registry.on_level_change().unwrap();
    let second = serial_of(&registry, "a.smx");
    assert_ne!(first, second);
    assert_eq!(status_of(&registry, "a.smx"), PluginStatus::Running);
}

#[test]
fn test_hot_reload_policies() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "always.smx", simple_plugin("Always"));
    write_plugin(temp_dir.path(), "pinned.smx", simple_plugin("Pinned"));

    let mut registry = new_registry(&temp_dir);
    registry.set_policy(LoadPolicy::new(vec![
        PolicyRule {
            reload: ReloadPolicy::LevelChange,
            ..PolicyRule::new("always")
        },
        PolicyRule {
            reload: ReloadPolicy::Never,
            ..PolicyRule::new("pinned")
        },
    ]));
    registry.load_all().unwrap();

    let always = serial_of(&registry, "always.smx");
    let pinned = serial_of(&registry, "pinned.smx");
    assert_eq!(
        registry.get(pinned).unwrap().reload_policy(),
        ReloadPolicy::Never
    );

    std::fs::remove_file(temp_dir.path().join("pinned.smx")).unwrap();
    registry.on_level_change().unwrap();

    assert_ne!(serial_of(&registry, "always.smx"), always);
    assert_eq!(serial_of(&registry, "pinned.smx"), pinned);
}

#[test]
fn test_hot_reload_drops_deleted_files() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "a.smx", simple_plugin("A"));

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    std::fs::remove_file(temp_dir.path().join("a.smx")).unwrap();
    assert_eq!(registry.reload_or_unload_plugins(), 1);
    assert!(registry.is_empty());
}

#[test]
fn test_load_lock() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "a.smx", simple_plugin("A"));

    let mut registry = new_registry(&temp_dir);
    registry.set_loading_locked(true);
    assert_eq!(registry.load_all().unwrap(), 0);
    assert!(registry.is_empty());

    registry.set_loading_locked(false);
    registry.load_all().unwrap();
    let a = serial_of(&registry, "a.smx");

    registry.set_loading_locked(true);
    assert!(matches!(
        registry.reload_plugin(a),
        Err(PluginError::LoadLocked)
    ));
    assert_eq!(registry.reload_or_unload_plugins(), 0);
    registry.on_level_change().unwrap();
    assert_eq!(serial_of(&registry, "a.smx"), a);

    // Unloading is still allowed.
    registry.unload_plugin(a).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn test_load_policy() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "fun/slap.smx", simple_plugin("Slap"));
    write_plugin(temp_dir.path(), "admin.smx", simple_plugin("Admin"));
    write_plugin(temp_dir.path(), "disabled/old.smx", simple_plugin("Old"));

    let mut registry = new_registry(&temp_dir);
    registry.set_policy(LoadPolicy::new(vec![
        PolicyRule {
            block_load: true,
            ..PolicyRule::new("fun/*")
        },
        PolicyRule {
            debug: true,
            ..PolicyRule::new("admin")
        },
    ]));
    registry.load_all().unwrap();

    assert_eq!(registry.len(), 1);
    assert!(registry.find_by_path("admin.smx").unwrap().is_debugging());
    assert!(matches!(
        registry.load_plugin("fun/slap.smx"),
        Err(PluginError::Blocked(_))
    ));
}

#[test]
fn test_deferred_unload() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "a.smx", simple_plugin("A"));

    let busy = Rc::new(Cell::new(false));
    let mut registry = PluginRegistry::new(
        temp_dir.path(),
        Box::new(BusyCompiler {
            busy: Rc::clone(&busy),
        }),
        Box::new(StaticHost::default()),
    );
    registry.load_all().unwrap();
    let a = serial_of(&registry, "a.smx");

    busy.set(true);
    assert!(matches!(
        registry.unload_plugin(a),
        Err(PluginError::Deferred(_))
    ));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.pending_commands(), 1);

    // Still executing on the next tick: queued again.
    registry.on_tick();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.pending_commands(), 1);

    busy.set(false);
    registry.on_tick();
    assert!(registry.is_empty());
    assert_eq!(registry.pending_commands(), 0);
}

#[test]
fn test_listener_event_order() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "a.smx", simple_plugin("A"));
    write_plugin(
        temp_dir.path(),
        "b.smx",
        json!({"version": 1, "on_load": {"decision": "failure"}}),
    );

    let events = Rc::new(RefCell::new(Vec::new()));
    let mut registry = new_registry(&temp_dir);
    let id = registry.add_listener(Box::new(Recorder(Rc::clone(&events))));

    registry.load_all().unwrap();
    registry.unload_all();

    assert_eq!(
        *events.borrow(),
        [
            "created:a.smx",
            "created:b.smx",
            "loaded:a.smx",
            "unloaded:a.smx",
            "destroyed:a.smx",
            "destroyed:b.smx",
        ]
    );

    assert!(registry.remove_listener(id));
    assert!(!registry.remove_listener(id));
}

// ==============================================================================
// Console
// ==============================================================================

#[test]
fn test_console_session() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(temp_dir.path(), "base.smx", simple_plugin("Base"));
    write_plugin(
        temp_dir.path(),
        "refuse.smx",
        json!({"version": 1, "info": {"name": "Refuse"}, "on_load": {"decision": "failure", "error": "No"}}),
    );

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    assert_eq!(
        run_console(&mut registry, "list"),
        [
            "[plugins] Listing 2 plugin(s):",
            "  01 \"Base\" (1.0) by tests",
            "  02 <Failed> \"Refuse\"",
            "Load Errors:",
            "refuse.smx: No",
        ]
    );

    assert_eq!(
        run_console(&mut registry, "load base"),
        ["[plugins] Plugin base.smx is already loaded."]
    );

    let info = run_console(&mut registry, "info 1");
    assert_eq!(info[0], "  Filename: base.smx");
    assert!(info.contains(&"  Title: Base".to_string()));
    assert!(info.contains(&"  Status: Running".to_string()));
    assert!(info.contains(&"  Reloads: Level Change if Updated".to_string()));

    let info = run_console(&mut registry, "info 2");
    assert!(info.contains(&"  Load error: No".to_string()));

    assert_eq!(
        run_console(&mut registry, "reload base"),
        ["[plugins] Plugin Base reloaded successfully."]
    );
    assert_eq!(
        run_console(&mut registry, "unload 1"),
        ["[plugins] Plugin Base unloaded successfully."]
    );
    assert_eq!(
        run_console(&mut registry, "load missing"),
        ["[plugins] Plugin missing.smx failed to load: Unable to load plugin (Unable to open file: "
            .to_string()
            + &temp_dir.path().join("missing.smx").display().to_string()
            + ")."]
    );
    assert_eq!(
        run_console(&mut registry, "unload_all"),
        ["[plugins] All plugins have been unloaded."]
    );
    assert_eq!(
        run_console(&mut registry, "refresh"),
        ["[plugins] The plugin list has been refreshed and reloaded."]
    );
    assert_eq!(registry.len(), 2);
    assert_eq!(
        run_console(&mut registry, "unload"),
        ["[plugins] Usage: plugins unload <#|file>"]
    );
}

#[test]
fn test_console_lists_silent_failure_as_disabled() {
    let temp_dir = TempDir::new().unwrap();
    write_plugin(
        temp_dir.path(),
        "quiet.smx",
        json!({
            "version": 1,
            "info": {"name": "Quiet"},
            "on_load": {"decision": "silent_failure", "error": "Not this map"}
        }),
    );

    let mut registry = new_registry(&temp_dir);
    registry.load_all().unwrap();

    assert_eq!(
        run_console(&mut registry, "list"),
        ["[plugins] Listing 1 plugin(s):", "  01 Disabled: \"Quiet\""]
    );
}

//! Services the host process offers the plugin system.
//!
//! Plugins may declare host extensions they need. The registry asks the
//! host whether those extensions run and tells it which plugins depend on
//! them.

use script_runtime::IdentityToken;
use std::collections::HashSet;
use tracing::debug;

/// Extension management as seen by the plugin registry.
pub trait HostServices {
    /// Whether an extension with this name or file is running.
    fn is_extension_running(&self, name: &str, file: &str) -> bool;

    /// Try to load an extension a plugin marked as autoload.
    ///
    /// Returns whether the extension is running afterwards.
    fn load_auto_extension(&mut self, file: &str, required: bool) -> bool;

    /// Record that the plugin holding `identity` depends on `extension`.
    fn bind_child_plugin(&mut self, extension: &str, identity: IdentityToken);
}

/// Host with a fixed set of running extensions.
#[derive(Debug, Default, Clone)]
pub struct StaticHost {
    running: HashSet<String>,
    autoload_requests: Vec<String>,
    children: Vec<(String, IdentityToken)>,
}

impl StaticHost {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            running: extensions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Files plugins asked to autoload, in request order.
    pub fn autoload_requests(&self) -> &[String] {
        &self.autoload_requests
    }

    /// Plugins bound to each extension.
    pub fn children(&self) -> &[(String, IdentityToken)] {
        &self.children
    }
}

impl HostServices for StaticHost {
    fn is_extension_running(&self, name: &str, file: &str) -> bool {
        self.running.contains(name) || self.running.contains(file)
    }

    fn load_auto_extension(&mut self, file: &str, required: bool) -> bool {
        debug!(file, required, "Autoload extension requested");
        self.autoload_requests.push(file.to_string());
        self.running.contains(file)
    }

    fn bind_child_plugin(&mut self, extension: &str, identity: IdentityToken) {
        self.children.push((extension.to_string(), identity));
    }
}

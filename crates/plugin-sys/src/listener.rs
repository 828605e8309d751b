//! Lifecycle listeners.
//!
//! Collaborators register a [`PluginsListener`] with the registry and are
//! told about every plugin that is created, loaded, unloaded, destroyed or
//! paused. Events for one plugin always arrive in that relative order.

use crate::plugin::Plugin;

/// Observer of plugin lifecycle events. Every method defaults to a no-op.
pub trait PluginsListener {
    /// The plugin was added to the registry after its first pass.
    fn on_plugin_created(&mut self, _plugin: &Plugin) {}

    /// The plugin resolved its dependencies and is about to start.
    fn on_plugin_loaded(&mut self, _plugin: &Plugin) {}

    /// The plugin is being unloaded after having been loaded.
    fn on_plugin_unloaded(&mut self, _plugin: &Plugin) {}

    /// The plugin is about to be freed.
    fn on_plugin_destroyed(&mut self, _plugin: &Plugin) {}

    fn on_plugin_pause_change(&mut self, _plugin: &Plugin, _paused: bool) {}
}

/// Handle returned by registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleEvent {
    Created,
    Loaded,
    Unloaded,
    Destroyed,
    PauseChange(bool),
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Box<dyn PluginsListener>)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: Box<dyn PluginsListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn notify(&mut self, plugin: &Plugin, event: LifecycleEvent) {
        for (_, listener) in &mut self.entries {
            match event {
                LifecycleEvent::Created => listener.on_plugin_created(plugin),
                LifecycleEvent::Loaded => listener.on_plugin_loaded(plugin),
                LifecycleEvent::Unloaded => listener.on_plugin_unloaded(plugin),
                LifecycleEvent::Destroyed => listener.on_plugin_destroyed(plugin),
                LifecycleEvent::PauseChange(paused) => {
                    listener.on_plugin_pause_change(plugin, paused)
                }
            }
        }
    }
}

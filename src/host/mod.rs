pub mod events;
pub mod registry;
pub mod stores;

use events::EventBus;
use registry::InjectionRegistry;
use std::sync::Arc;
use stores::{MemoryStore, ToolStore, UiStore};

/// Everything an adapter receives from the plugin host.
#[derive(Clone)]
pub struct PluginContext {
    pub events: Arc<EventBus>,
    pub ui: Arc<dyn UiStore>,
    pub tools: Arc<dyn ToolStore>,
    pub registry: Arc<InjectionRegistry>,
}

impl PluginContext {
    pub fn new(events: Arc<EventBus>, ui: Arc<dyn UiStore>, tools: Arc<dyn ToolStore>) -> Self {
        Self {
            events,
            ui,
            tools,
            registry: Arc::new(InjectionRegistry::default()),
        }
    }

    /// Context backed by one [`MemoryStore`] serving both store roles.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self::new(Arc::new(EventBus::new()), store.clone(), store)
    }
}

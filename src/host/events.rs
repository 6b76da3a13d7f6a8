use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const ADAPTER_ACTIVATED: &str = "adapter:activated";
pub const ADAPTER_DEACTIVATED: &str = "adapter:deactivated";
pub const TOOL_EXECUTION_COMPLETED: &str = "tool:execution-completed";
pub const TOOL_EXECUTION_FAILED: &str = "tool:execution-failed";
pub const SITE_CHANGED: &str = "app:site-changed";
pub const SIDEBAR_TOGGLE: &str = "ui:sidebar-toggle";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePayload {
    pub plugin_name: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub result: Value,
    pub status: ExecutionStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    pub tool_name: String,
    pub error: String,
    pub kind: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteChangedPayload {
    pub plugin_name: String,
    pub url: String,
    pub hostname: String,
    pub supported: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SidebarTogglePayload {
    pub visible: bool,
}

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Named-event bus shared by the host and every adapter.
///
/// Handlers run synchronously inside `emit`, outside the handler lock, so a
/// handler may emit or subscribe again.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, Handler)>>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
        }
        handlers.retain(|_, list| !list.is_empty());
        removed
    }

    pub fn emit<T: Serialize>(&self, event: &str, payload: &T) {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                log::error!("[events] cannot serialize {} payload: {}", event, e);
                return;
            }
        };
        let handlers: Vec<Handler> = self
            .lock()
            .get(event)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();
        log::debug!("[events] {} -> {} handler(s)", event, handlers.len());
        for handler in handlers {
            handler(&value);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().get(event).map(Vec::len).unwrap_or(0)
    }
}

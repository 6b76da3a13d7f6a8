use super::events::ExecutionResult;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Popover switches. The store owns them; adapters only read and write
/// through [`UiStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleState {
    pub mcp_enabled: bool,
    pub auto_insert: bool,
    pub auto_submit: bool,
    pub auto_execute: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    pub auto_insert: Option<bool>,
    pub auto_submit: Option<bool>,
    pub auto_execute: Option<bool>,
}

impl PreferencesUpdate {
    pub fn apply(&self, state: &mut ToggleState) {
        if let Some(value) = self.auto_insert {
            state.auto_insert = value;
        }
        if let Some(value) = self.auto_submit {
            state.auto_submit = value;
        }
        if let Some(value) = self.auto_execute {
            state.auto_execute = value;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.auto_insert.is_none() && self.auto_submit.is_none() && self.auto_execute.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedTool {
    pub name: String,
    pub server: Option<String>,
    pub detected_at: i64,
}

pub trait UiStore: Send + Sync {
    fn toggle_state(&self) -> ToggleState;
    fn set_mcp_enabled(&self, enabled: bool, reason: &str) -> Result<()>;
    fn update_preferences(&self, update: PreferencesUpdate) -> Result<()>;
    fn sidebar_visible(&self) -> bool;
    fn set_sidebar_visible(&self, visible: bool) -> Result<()>;
}

/// Executions kept per store; older ones are dropped on insert.
pub const EXECUTION_HISTORY_LIMIT: usize = 200;

pub trait ToolStore: Send + Sync {
    fn add_detected_tool(&self, tool: DetectedTool) -> Result<()>;
    fn detected_tools(&self) -> Result<Vec<DetectedTool>>;
    fn record_execution(&self, execution: &ExecutionResult) -> Result<()>;
    fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionResult>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    toggles: ToggleState,
    sidebar_visible: bool,
    tools: BTreeMap<String, DetectedTool>,
    executions: Vec<ExecutionResult>,
}

/// Process-local stores for hosts that do not persist anything.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_toggles(toggles: ToggleState) -> Self {
        let store = Self::default();
        store.lock().toggles = toggles;
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UiStore for MemoryStore {
    fn toggle_state(&self) -> ToggleState {
        self.lock().toggles
    }

    fn set_mcp_enabled(&self, enabled: bool, reason: &str) -> Result<()> {
        log::info!("[store] mcp_enabled={} ({})", enabled, reason);
        self.lock().toggles.mcp_enabled = enabled;
        Ok(())
    }

    fn update_preferences(&self, update: PreferencesUpdate) -> Result<()> {
        update.apply(&mut self.lock().toggles);
        Ok(())
    }

    fn sidebar_visible(&self) -> bool {
        self.lock().sidebar_visible
    }

    fn set_sidebar_visible(&self, visible: bool) -> Result<()> {
        self.lock().sidebar_visible = visible;
        Ok(())
    }
}

impl ToolStore for MemoryStore {
    fn add_detected_tool(&self, tool: DetectedTool) -> Result<()> {
        self.lock().tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    fn detected_tools(&self) -> Result<Vec<DetectedTool>> {
        Ok(self.lock().tools.values().cloned().collect())
    }

    fn record_execution(&self, execution: &ExecutionResult) -> Result<()> {
        let mut state = self.lock();
        state.executions.push(execution.clone());
        let overflow = state.executions.len().saturating_sub(EXECUTION_HISTORY_LIMIT);
        state.executions.drain(..overflow);
        Ok(())
    }

    fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionResult>> {
        let state = self.lock();
        Ok(state.executions.iter().rev().take(limit).cloned().collect())
    }
}

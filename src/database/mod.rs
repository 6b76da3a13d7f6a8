pub mod queries;
pub mod schema;

use crate::host::events::ExecutionResult;
use crate::host::stores::{
    DetectedTool, PreferencesUpdate, ToggleState, ToolStore, UiStore, EXECUTION_HISTORY_LIMIT,
};
use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed preference and tool history store.
pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::create_tables(&conn)?;
        log::info!("Database ready at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flag(&self, key: &str) -> bool {
        match queries::get_flag(&self.lock(), key) {
            Ok(value) => value.unwrap_or(false),
            Err(e) => {
                log::warn!("[db] reading {} failed: {}", key, e);
                false
            }
        }
    }
}

impl UiStore for Database {
    fn toggle_state(&self) -> ToggleState {
        ToggleState {
            mcp_enabled: self.flag(queries::MCP_ENABLED),
            auto_insert: self.flag(queries::AUTO_INSERT),
            auto_submit: self.flag(queries::AUTO_SUBMIT),
            auto_execute: self.flag(queries::AUTO_EXECUTE),
        }
    }

    fn set_mcp_enabled(&self, enabled: bool, reason: &str) -> Result<()> {
        log::info!("[db] mcp_enabled={} ({})", enabled, reason);
        queries::set_flag(&self.lock(), queries::MCP_ENABLED, enabled, Some(reason))
    }

    fn update_preferences(&self, update: PreferencesUpdate) -> Result<()> {
        let conn = self.lock();
        let fields = [
            (queries::AUTO_INSERT, update.auto_insert),
            (queries::AUTO_SUBMIT, update.auto_submit),
            (queries::AUTO_EXECUTE, update.auto_execute),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                queries::set_flag(&conn, key, value, None)?;
            }
        }
        Ok(())
    }

    fn sidebar_visible(&self) -> bool {
        self.flag(queries::SIDEBAR_VISIBLE)
    }

    fn set_sidebar_visible(&self, visible: bool) -> Result<()> {
        queries::set_flag(&self.lock(), queries::SIDEBAR_VISIBLE, visible, None)
    }
}

impl ToolStore for Database {
    fn add_detected_tool(&self, tool: DetectedTool) -> Result<()> {
        queries::upsert_detected_tool(&self.lock(), &tool)
    }

    fn detected_tools(&self) -> Result<Vec<DetectedTool>> {
        queries::get_detected_tools(&self.lock())
    }

    fn record_execution(&self, execution: &ExecutionResult) -> Result<()> {
        let conn = self.lock();
        queries::insert_execution(&conn, execution)?;
        queries::trim_executions(&conn, EXECUTION_HISTORY_LIMIT)?;
        Ok(())
    }

    fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionResult>> {
        queries::get_recent_executions(&self.lock(), limit)
    }
}

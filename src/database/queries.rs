use crate::host::events::{ExecutionResult, ExecutionStatus};
use crate::host::stores::DetectedTool;
use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

pub const MCP_ENABLED: &str = "mcp_enabled";
pub const AUTO_INSERT: &str = "auto_insert";
pub const AUTO_SUBMIT: &str = "auto_submit";
pub const AUTO_EXECUTE: &str = "auto_execute";
pub const SIDEBAR_VISIBLE: &str = "sidebar_visible";

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceChange {
    pub key: String,
    pub value: bool,
    pub reason: Option<String>,
    pub changed_at: String,
}

// ========== Preference Queries ==========

pub fn get_flag(conn: &Connection, key: &str) -> Result<Option<bool>> {
    let value = conn
        .query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            params![key],
            |row| row.get::<_, bool>(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_flag(conn: &Connection, key: &str, value: bool, reason: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT INTO preferences (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
        params![key, value],
    )?;
    conn.execute(
        "INSERT INTO preference_changes (key, value, reason) VALUES (?1, ?2, ?3)",
        params![key, value, reason],
    )?;
    Ok(())
}

pub fn recent_preference_changes(conn: &Connection, limit: usize) -> Result<Vec<PreferenceChange>> {
    let mut stmt = conn.prepare(
        "SELECT key, value, reason, changed_at FROM preference_changes ORDER BY id DESC LIMIT ?1",
    )?;
    let changes = stmt
        .query_map(params![limit as i64], |row| {
            Ok(PreferenceChange {
                key: row.get(0)?,
                value: row.get(1)?,
                reason: row.get(2)?,
                changed_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(changes)
}

// ========== Tool Queries ==========

pub fn upsert_detected_tool(conn: &Connection, tool: &DetectedTool) -> Result<()> {
    conn.execute(
        "INSERT INTO detected_tools (name, server, detected_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET server = excluded.server, detected_at = excluded.detected_at",
        params![tool.name, tool.server, tool.detected_at],
    )?;
    Ok(())
}

pub fn get_detected_tools(conn: &Connection) -> Result<Vec<DetectedTool>> {
    let mut stmt =
        conn.prepare("SELECT name, server, detected_at FROM detected_tools ORDER BY name")?;
    let tools = stmt
        .query_map([], |row| {
            Ok(DetectedTool {
                name: row.get(0)?,
                server: row.get(1)?,
                detected_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tools)
}

pub fn insert_execution(conn: &Connection, execution: &ExecutionResult) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO tool_executions (id, tool_name, parameters, result, status, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            execution.id,
            execution.tool_name,
            execution.parameters.to_string(),
            execution.result.to_string(),
            execution.status.as_str(),
            execution.timestamp,
        ],
    )?;
    Ok(())
}

/// Keep only the newest `keep` executions.
pub fn trim_executions(conn: &Connection, keep: usize) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM tool_executions WHERE rowid NOT IN (
             SELECT rowid FROM tool_executions ORDER BY timestamp DESC, rowid DESC LIMIT ?1
         )",
        params![keep as i64],
    )?;
    Ok(removed)
}

pub fn get_recent_executions(conn: &Connection, limit: usize) -> Result<Vec<ExecutionResult>> {
    let mut stmt = conn.prepare(
        "SELECT id, tool_name, parameters, result, status, timestamp FROM tool_executions
         ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, tool_name, parameters, result, status, timestamp)| -> Result<ExecutionResult> {
            Ok(ExecutionResult {
                id,
                tool_name,
                parameters: serde_json::from_str(&parameters)?,
                result: serde_json::from_str(&result)?,
                status: parse_status(&status)?,
                timestamp,
            })
        })
        .collect()
}

fn parse_status(raw: &str) -> Result<ExecutionStatus> {
    match raw {
        "success" => Ok(ExecutionStatus::Success),
        "error" => Ok(ExecutionStatus::Error),
        other => bail!("Unknown execution status in database: {}", other),
    }
}

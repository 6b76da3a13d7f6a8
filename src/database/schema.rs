use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS preference_changes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            value INTEGER NOT NULL,
            reason TEXT,
            changed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS detected_tools (
            name TEXT PRIMARY KEY,
            server TEXT,
            detected_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tool_executions (
            id TEXT PRIMARY KEY,
            tool_name TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT 'null',
            result TEXT NOT NULL DEFAULT 'null',
            status TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_tool_executions_timestamp
            ON tool_executions (timestamp DESC);
        ",
    )?;
    Ok(())
}

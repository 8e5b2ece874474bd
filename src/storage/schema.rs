//! Alert table schema.

use anyhow::Result;
use rusqlite::Connection;

/// Create the alert table `table` if it does not exist.
///
/// Cells are stored as TEXT so that imports keep the source values verbatim;
/// coercion happens at normalization.
pub fn migrate(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL,
            rule_description TEXT NOT NULL DEFAULT '',
            agent_name TEXT NOT NULL DEFAULT '',
            level TEXT NOT NULL DEFAULT '',
            bytes_transferred TEXT,
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_agent ON {table}(agent_name);",
        table = table
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn, "alerts")?;
        migrate(&conn, "alerts")?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |r| r.get(0))?;
        assert_eq!(count, 0);
        Ok(())
    }
}

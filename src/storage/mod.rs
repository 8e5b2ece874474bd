//! SQLite alert source -- pool, schema, reads and imports.

pub mod schema;

use std::time::Duration;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags};
use tracing::info;

use crate::ingest::{resolve_columns, RawRow, SourceError};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
    });
    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database {}", path))?;
    Ok(pool)
}

fn valid_table_name(table: &str) -> bool {
    !table.is_empty() && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn cell_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Read every row of `table` in rowid order as untyped rows.
///
/// The database is opened read-only and its journal mode is left alone.
/// A missing database file or table is `Unavailable`; a table without the
/// required columns is `MissingColumns`.
pub fn load_rows(db_path: &str, table: &str) -> Result<Vec<RawRow>, SourceError> {
    if !std::path::Path::new(db_path).exists() {
        return Err(SourceError::Unavailable(format!("{} not found", db_path)));
    }
    if !valid_table_name(table) {
        return Err(SourceError::Read(format!("invalid table name '{}'", table)));
    }
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", db_path, e)))?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;

    let sql = format!("SELECT * FROM {} ORDER BY rowid", table);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| SourceError::Unavailable(format!("table '{}': {}", table, e)))?;

    let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let columns = resolve_columns(names.iter().map(String::as_str))?;
    let width = names.len();

    let cells = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i).map(cell_to_string))
                .collect::<rusqlite::Result<Vec<Option<String>>>>()
        })
        .map_err(|e| SourceError::Read(e.to_string()))?;

    let mut rows = Vec::new();
    for (idx, r) in cells.enumerate() {
        let cells = r.map_err(|e| SourceError::Read(e.to_string()))?;
        rows.push(columns.build_row(idx as u64 + 1, |i| cells.get(i).cloned().flatten()));
    }

    info!(db = %db_path, table = %table, rows = rows.len(), "read alert table");
    Ok(rows)
}

/// Insert raw rows into `table`, creating it if needed. Returns rows written.
pub fn import_rows(pool: &Pool, table: &str, rows: &[RawRow]) -> Result<usize> {
    if !valid_table_name(table) {
        anyhow::bail!("invalid table name '{}'", table);
    }
    let mut conn = pool.get()?;
    schema::migrate(&conn, table)?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} (timestamp, rule_description, agent_name, level, bytes_transferred)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            table
        ))?;
        for row in rows {
            stmt.execute(params![
                row.timestamp,
                row.rule_description,
                row.agent_name,
                row.level,
                row.bytes_transferred
            ])?;
        }
    }
    tx.commit().context("Failed to commit alert import")?;

    info!(table = %table, rows = rows.len(), "imported alerts");
    Ok(rows.len())
}

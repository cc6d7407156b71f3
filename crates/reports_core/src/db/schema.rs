//! Read-only schema introspection helpers.

use super::DbResult;
use rusqlite::{Connection, OptionalExtension};

/// One `sqlite_master` entry: `(type, name, sql)`.
pub type SchemaObject = (String, String, Option<String>);

/// Lists user tables, excluding SQLite internal tables.
pub fn list_tables(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name;",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Lists user views.
pub fn list_views(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'view' ORDER BY name;",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Lists `AUTOINCREMENT` sequences (rows of `sqlite_sequence`).
///
/// Returns an empty list when no sequence table has been created yet.
pub fn list_sequences(conn: &Connection) -> DbResult<Vec<String>> {
    let has_sequences = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence';",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !has_sequences {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT name FROM sqlite_sequence ORDER BY name;")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Lists column names of `table` in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid;")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Returns `(referencing_table, referenced_table)` pairs for every
/// foreign-key constraint declared on `table`.
pub fn foreign_keys(conn: &Connection, table: &str) -> DbResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT DISTINCT \"table\" FROM pragma_foreign_key_list(?1);")?;
    let pairs = stmt
        .query_map([table], |row| {
            Ok((table.to_string(), row.get::<_, String>(0)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pairs)
}

/// Deterministic snapshot of every user schema object.
pub fn describe_schema(conn: &Connection) -> DbResult<Vec<SchemaObject>> {
    let mut stmt = conn.prepare(
        "SELECT type, name, sql FROM sqlite_master
         WHERE name NOT LIKE 'sqlite_%'
         ORDER BY type, name;",
    )?;
    let objects = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(objects)
}

//! Destructive schema reset used to prepare a test database.
//!
//! # Responsibility
//! - Remove every table, view and sequence from a live database.
//! - Rebuild the schema through the versioned migration path.
//!
//! # Invariants
//! - Runs only when no other connection from the engine is checked out.
//! - Never runs inside an open transaction.
//! - A failing sequence drop is logged and skipped; it never aborts the reset.
//! - `foreign_keys` is switched back on even when the drop pass fails.

use super::migrations::upgrade;
use super::schema::{foreign_keys, list_sequences, list_tables, list_views};
use super::{DbError, DbResult, Engine};
use log::{info, warn};
use rusqlite::Connection;

/// Counts of objects removed by [`clear_schema`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub foreign_keys_dropped: usize,
    pub views_dropped: usize,
    pub tables_dropped: usize,
    pub sequences_dropped: usize,
    pub sequence_failures: Vec<String>,
}

/// Outcome of [`reset_database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub cleared: ClearReport,
    pub schema_version: u32,
}

/// Drops every user object in the database and resets the migration version.
///
/// SQLite cannot drop a constraint in place, so foreign keys are enumerated
/// and their enforcement is switched off for the duration of the drop pass.
pub fn clear_schema(conn: &Connection) -> DbResult<ClearReport> {
    if !conn.is_autocommit() {
        return Err(DbError::TransactionInProgress("schema reset"));
    }

    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    let result = drop_all_objects(conn);
    let restored = conn.execute_batch("PRAGMA foreign_keys = ON;");

    let report = result?;
    restored?;

    info!(
        "event=db_clear module=db status=ok tables={} views={} foreign_keys={} sequences={} sequence_failures={}",
        report.tables_dropped,
        report.views_dropped,
        report.foreign_keys_dropped,
        report.sequences_dropped,
        report.sequence_failures.len()
    );
    Ok(report)
}

fn drop_all_objects(conn: &Connection) -> DbResult<ClearReport> {
    let tables = list_tables(conn)?;
    let views = list_views(conn)?;
    let sequences = list_sequences(conn)?;
    let mut report = ClearReport::default();

    for table in &tables {
        report.foreign_keys_dropped += foreign_keys(conn, table)?.len();
    }

    conn.execute_batch("BEGIN;")?;
    let dropped = (|| -> DbResult<()> {
        for view in &views {
            conn.execute_batch(&format!("DROP VIEW IF EXISTS {};", quote_ident(view)))?;
        }
        for table in &tables {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(table)))?;
        }
        conn.execute_batch("PRAGMA user_version = 0;")?;
        Ok(())
    })();
    match dropped {
        Ok(()) => conn.execute_batch("COMMIT;")?,
        Err(err) => {
            conn.execute_batch("ROLLBACK;")?;
            return Err(err);
        }
    }
    report.views_dropped = views.len();
    report.tables_dropped = tables.len();

    for sequence in sequences {
        match drop_sequence(conn, &sequence) {
            Ok(()) => {
                report.sequences_dropped += 1;
                info!("event=db_drop_sequence module=db status=ok sequence={sequence}");
            }
            Err(err) => {
                warn!(
                    "event=db_drop_sequence module=db status=error sequence={sequence} error={err}"
                );
                report.sequence_failures.push(sequence);
            }
        }
    }

    Ok(report)
}

fn drop_sequence(conn: &Connection, sequence: &str) -> DbResult<()> {
    // Dropping an AUTOINCREMENT table usually removes its row already.
    if list_sequences(conn)?.iter().all(|name| name != sequence) {
        return Ok(());
    }
    conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1;", [sequence])?;
    Ok(())
}

/// Clears the schema behind `engine` and rebuilds it via [`upgrade`].
///
/// # Errors
/// - [`DbError::ResetWithOpenConnections`] while any connection (for example
///   an open isolation scope) is still checked out from `engine`.
pub fn reset_database(engine: &Engine) -> DbResult<ResetReport> {
    let open = engine.checked_out();
    if open > 0 {
        return Err(DbError::ResetWithOpenConnections { open });
    }

    let mut conn = engine.connect()?;
    let cleared = clear_schema(&conn)?;
    upgrade(&mut conn)?;
    let schema_version = super::migrations::current_version(&conn)?;
    conn.close()?;

    info!(
        "event=db_reset module=db status=ok path={} version={}",
        engine.path().display(),
        schema_version
    );
    Ok(ResetReport {
        cleared,
        schema_version,
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::quote_ident;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("projects"), "\"projects\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}

//! Connection source for one SQLite database file.
//!
//! # Responsibility
//! - Open configured physical connections on demand.
//! - Track how many connections are currently checked out, so callers can
//!   prove that every connection they opened was closed again.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - `checked_out()` drops back when a [`PooledConnection`] is dropped or closed.

use super::{DbError, DbResult};
use log::{debug, error};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection source bound to a single database file.
#[derive(Debug, Clone)]
pub struct Engine {
    path: PathBuf,
    checked_out: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            checked_out: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of connections from this engine that are still open.
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    /// Opens a new physical connection.
    ///
    /// # Errors
    /// - [`DbError::Connection`] when the file cannot be opened.
    /// - [`DbError::Sqlite`] when connection pragmas cannot be applied.
    pub fn connect(&self) -> DbResult<PooledConnection> {
        let conn = Connection::open(&self.path).map_err(|source| {
            error!(
                "event=db_connect module=db status=error path={} error={}",
                self.path.display(),
                source
            );
            DbError::Connection {
                target: self.path.clone(),
                source,
            }
        })?;

        configure_connection(&conn)?;

        let open = self.checked_out.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "event=db_connect module=db status=ok path={} checked_out={}",
            self.path.display(),
            open
        );

        Ok(PooledConnection {
            conn,
            _lease: Lease {
                counter: Arc::clone(&self.checked_out),
            },
        })
    }
}

pub(crate) fn configure_connection(conn: &Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// A physical connection checked out from an [`Engine`].
#[derive(Debug)]
pub struct PooledConnection {
    conn: Connection,
    _lease: Lease,
}

impl PooledConnection {
    /// Closes the physical connection, surfacing close errors.
    pub fn close(self) -> DbResult<()> {
        let PooledConnection { conn, _lease } = self;
        conn.close().map_err(|(_, err)| DbError::Sqlite(err))
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

#[derive(Debug)]
struct Lease {
    counter: Arc<AtomicUsize>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::db::DbError;

    #[test]
    fn checked_out_tracks_open_connections() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(dir.path().join("engine.db"));

        let first = engine.connect().unwrap();
        let second = engine.connect().unwrap();
        assert_eq!(engine.checked_out(), 2);

        drop(first);
        assert_eq!(engine.checked_out(), 1);

        second.close().unwrap();
        assert_eq!(engine.checked_out(), 0);
    }

    #[test]
    fn connect_to_missing_directory_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(dir.path().join("missing").join("engine.db"));

        let err = engine.connect().unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.to_string().starts_with("cannot connect"));
        assert_eq!(engine.checked_out(), 0);
    }

    #[test]
    fn connections_enforce_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(dir.path().join("fk.db"));
        let conn = engine.connect().unwrap();

        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}

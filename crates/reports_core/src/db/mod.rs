//! SQLite storage bootstrap, sessions and schema management entry points.
//!
//! # Responsibility
//! - Hand out configured SQLite connections through an [`Engine`].
//! - Provide the unit-of-work [`Session`] used by repositories.
//! - Apply versioned schema migrations and the destructive test reset.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod engine;
pub mod migrations;
mod open;
pub mod reset;
pub mod schema;
mod session;

pub use engine::{Engine, PooledConnection};
pub use open::{open_db, open_db_in_memory};
pub use session::{Session, TransactionEnd, TransactionListener, TransactionOutcome};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The connection source could not produce a connection.
    Connection {
        target: PathBuf,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    UnknownMigrationTarget {
        target: u32,
        current: u32,
    },
    ResetWithOpenConnections {
        open: usize,
    },
    TransactionInProgress(&'static str),
    OuterTransactionLost,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Connection { target, source } => {
                write!(f, "cannot connect to `{}`: {source}", target.display())
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::UnknownMigrationTarget { target, current } => write!(
                f,
                "cannot downgrade to version {target}: database is at version {current}"
            ),
            Self::ResetWithOpenConnections { open } => write!(
                f,
                "refusing to reset schema while {open} connection(s) are checked out"
            ),
            Self::TransactionInProgress(operation) => {
                write!(f, "{operation} cannot run inside an open transaction")
            }
            Self::OuterTransactionLost => write!(
                f,
                "outer test transaction was ended by code under test; writes may have persisted"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Connection { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

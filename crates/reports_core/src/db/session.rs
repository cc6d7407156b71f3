//! Unit-of-work session over one owned connection.
//!
//! # Responsibility
//! - Track the transaction stack of a connection: one root transaction plus
//!   any number of nested SAVEPOINT transactions.
//! - Cache records loaded by repositories (identity map) and expire them at
//!   transaction boundaries.
//! - Notify registered listeners whenever a tracked transaction ends.
//!
//! # Invariants
//! - A root transaction that joined an already open connection transaction
//!   never emits `COMMIT` or `ROLLBACK`; only the owner of that transaction may
//!   end it.
//! - `commit`/`rollback` always end the innermost open transaction.
//! - Listener errors are returned to the caller of `commit`/`rollback`.
//! - A pinned session always has a savepoint open after `close`.
//! - Sessions are `!Send`; one session is used by one thread.

use super::{DbResult, PooledConnection};
use log::debug;
use rusqlite::{CachedStatement, Connection, Params};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Observer fired synchronously after a session transaction ends.
pub type TransactionListener = Rc<dyn Fn(&Session, &TransactionEnd) -> DbResult<()>>;

/// How a tracked transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Commit,
    Rollback,
}

/// Description of a transaction that has just ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionEnd {
    /// Whether the ended transaction was a SAVEPOINT.
    pub nested: bool,
    /// Nesting of the enclosing transaction; `None` for the root.
    pub parent_nested: Option<bool>,
    pub outcome: TransactionOutcome,
    /// Number of transactions still open after this one ended.
    pub remaining: usize,
}

impl TransactionEnd {
    /// `true` when the ended transaction was a savepoint directly under the
    /// root transaction.
    pub fn is_outermost_savepoint(&self) -> bool {
        self.nested && self.parent_nested == Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Root { owned: bool },
    Savepoint { name: String },
}

impl Frame {
    fn is_nested(&self) -> bool {
        matches!(self, Self::Savepoint { .. })
    }
}

type IdentityKey = (&'static str, i64);

/// Session bound to exactly one connection.
pub struct Session {
    conn: PooledConnection,
    frames: RefCell<Vec<Frame>>,
    identity: RefCell<HashMap<IdentityKey, Box<dyn Any>>>,
    listeners: RefCell<Vec<TransactionListener>>,
    savepoint_seq: Cell<u64>,
    pinned: Cell<bool>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("frames", &self.frames.borrow())
            .field("cached", &self.identity.borrow().len())
            .field("listeners", &self.listeners.borrow().len())
            .field("pinned", &self.pinned.get())
            .finish()
    }
}

impl Session {
    pub fn new(conn: PooledConnection) -> Self {
        Self {
            conn,
            frames: RefCell::new(Vec::new()),
            identity: RefCell::new(HashMap::new()),
            listeners: RefCell::new(Vec::new()),
            savepoint_seq: Cell::new(0),
            pinned: Cell::new(false),
        }
    }

    /// Raw connection this session is bound to.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn into_connection(self) -> PooledConnection {
        self.conn
    }

    pub fn in_transaction(&self) -> bool {
        !self.frames.borrow().is_empty()
    }

    /// Number of open SAVEPOINT transactions.
    pub fn savepoint_depth(&self) -> usize {
        self.frames
            .borrow()
            .iter()
            .filter(|frame| frame.is_nested())
            .count()
    }

    /// Registers a listener fired after every transaction end.
    pub fn listen_transaction_end(&self, listener: TransactionListener) {
        self.listeners.borrow_mut().push(listener);
    }

    /// Explicitly begins the root transaction.
    ///
    /// # Errors
    /// - `TransactionInProgress` when a transaction is already open.
    pub fn begin(&self) -> DbResult<()> {
        if self.in_transaction() {
            return Err(super::DbError::TransactionInProgress("begin"));
        }
        self.autobegin()
    }

    /// Opens a SAVEPOINT inside the current transaction, beginning the root
    /// transaction first when needed.
    pub fn begin_nested(&self) -> DbResult<()> {
        self.autobegin()?;

        let seq = self.savepoint_seq.get() + 1;
        self.savepoint_seq.set(seq);
        let name = format!("sp_{seq}");
        self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;

        debug!("event=session_savepoint module=db status=ok name={name}");
        self.frames.borrow_mut().push(Frame::Savepoint { name });
        Ok(())
    }

    /// Commits the innermost open transaction. No-op without a transaction.
    pub fn commit(&self) -> DbResult<()> {
        self.end_transaction(TransactionOutcome::Commit)
    }

    /// Rolls back the innermost open transaction. No-op without a transaction.
    pub fn rollback(&self) -> DbResult<()> {
        self.end_transaction(TransactionOutcome::Rollback)
    }

    /// Rolls back every transaction this session opened, clears cached state
    /// and detaches listeners. The session can be used again afterwards.
    ///
    /// A pinned session keeps its listeners and reopens one savepoint instead,
    /// so it is never left without one.
    pub fn close(&self) -> DbResult<()> {
        if self.pinned.get() {
            self.rollback_all()?;
            return self.begin_nested();
        }
        self.detach()
    }

    /// Keeps a savepoint open across [`close`](Self::close) until
    /// [`detach`](Self::detach) is called.
    pub(crate) fn pin(&self) {
        self.pinned.set(true);
    }

    /// Unpins the session, detaches listeners and rolls back every transaction
    /// this session opened.
    pub(crate) fn detach(&self) -> DbResult<()> {
        self.pinned.set(false);
        self.listeners.borrow_mut().clear();
        self.rollback_all()
    }

    fn rollback_all(&self) -> DbResult<()> {
        let frames = std::mem::take(&mut *self.frames.borrow_mut());
        self.expire_all();

        let mut first_error = None;
        for frame in frames.iter().rev() {
            let sql = match frame {
                Frame::Savepoint { name } => {
                    format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};")
                }
                Frame::Root { owned: true } => "ROLLBACK;".to_string(),
                Frame::Root { owned: false } => continue,
            };
            if let Err(err) = self.conn.execute_batch(&sql) {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Executes one statement inside the session transaction.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        self.autobegin()?;
        Ok(self.conn.execute(sql, params)?)
    }

    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.autobegin()?;
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Prepares a cached statement inside the session transaction.
    pub fn prepare(&self, sql: &str) -> DbResult<CachedStatement<'_>> {
        self.autobegin()?;
        Ok(self.conn.prepare_cached(sql)?)
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Returns the cached record for `(table, id)` if it has not expired.
    pub fn cached<T: Clone + 'static>(&self, table: &'static str, id: i64) -> Option<T> {
        self.identity
            .borrow()
            .get(&(table, id))
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Stores a loaded record in the identity map.
    pub fn remember<T: 'static>(&self, table: &'static str, id: i64, value: T) {
        self.identity
            .borrow_mut()
            .insert((table, id), Box::new(value));
    }

    pub fn cached_count(&self) -> usize {
        self.identity.borrow().len()
    }

    pub fn expire(&self, table: &'static str, id: i64) {
        self.identity.borrow_mut().remove(&(table, id));
    }

    /// Drops every cached record so the next read refetches from the database.
    pub fn expire_all(&self) {
        self.identity.borrow_mut().clear();
    }

    fn autobegin(&self) -> DbResult<()> {
        if self.in_transaction() {
            return Ok(());
        }

        let owned = self.conn.is_autocommit();
        if owned {
            self.conn.execute_batch("BEGIN;")?;
        }
        self.frames.borrow_mut().push(Frame::Root { owned });
        Ok(())
    }

    fn end_transaction(&self, outcome: TransactionOutcome) -> DbResult<()> {
        let Some(top) = self.frames.borrow().last().cloned() else {
            return Ok(());
        };

        let sql = match (&top, outcome) {
            (Frame::Savepoint { name }, TransactionOutcome::Commit) => {
                Some(format!("RELEASE SAVEPOINT {name};"))
            }
            (Frame::Savepoint { name }, TransactionOutcome::Rollback) => Some(format!(
                "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"
            )),
            (Frame::Root { owned: true }, TransactionOutcome::Commit) => Some("COMMIT;".to_string()),
            (Frame::Root { owned: true }, TransactionOutcome::Rollback) => {
                Some("ROLLBACK;".to_string())
            }
            (Frame::Root { owned: false }, _) => None,
        };
        if let Some(sql) = sql {
            self.conn.execute_batch(&sql)?;
        }

        let ended = {
            let mut frames = self.frames.borrow_mut();
            frames.pop();
            TransactionEnd {
                nested: top.is_nested(),
                parent_nested: frames.last().map(Frame::is_nested),
                outcome,
                remaining: frames.len(),
            }
        };

        if outcome == TransactionOutcome::Rollback || !ended.nested {
            self.expire_all();
        }

        debug!(
            "event=session_transaction_end module=db status=ok outcome={:?} nested={} remaining={}",
            ended.outcome, ended.nested, ended.remaining
        );

        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(self, &ended)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, TransactionEnd, TransactionOutcome};
    use crate::db::{DbResult, Engine};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(dir.path().join("session.db"));
        let conn = engine.connect().unwrap();
        conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);")
            .unwrap();
        (dir, engine)
    }

    fn count_notes(engine: &Engine) -> i64 {
        let conn = engine.connect().unwrap();
        conn.query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn owned_root_commit_is_durable() {
        let (_dir, engine) = setup();
        let session = Session::new(engine.connect().unwrap());

        session
            .execute("INSERT INTO notes (body) VALUES (?1);", ["kept"])
            .unwrap();
        assert!(session.in_transaction());
        session.commit().unwrap();

        assert!(!session.in_transaction());
        assert_eq!(count_notes(&engine), 1);
    }

    #[test]
    fn savepoint_rollback_keeps_enclosing_work() {
        let (_dir, engine) = setup();
        let session = Session::new(engine.connect().unwrap());

        session
            .execute("INSERT INTO notes (body) VALUES (?1);", ["outer"])
            .unwrap();
        session.begin_nested().unwrap();
        session
            .execute("INSERT INTO notes (body) VALUES (?1);", ["inner"])
            .unwrap();
        assert_eq!(session.savepoint_depth(), 1);

        session.rollback().unwrap();
        assert_eq!(session.savepoint_depth(), 0);
        session.commit().unwrap();

        let bodies: Vec<String> = {
            let conn = engine.connect().unwrap();
            let mut stmt = conn.prepare("SELECT body FROM notes;").unwrap();
            let rows = stmt.query_map([], |row| row.get(0)).unwrap();
            rows.map(Result::unwrap).collect()
        };
        assert_eq!(bodies, vec!["outer".to_string()]);
    }

    #[test]
    fn joined_root_never_commits_the_connection_transaction() {
        let (_dir, engine) = setup();
        let conn = engine.connect().unwrap();
        conn.execute_batch("BEGIN;").unwrap();
        let session = Session::new(conn);

        session
            .execute("INSERT INTO notes (body) VALUES (?1);", ["joined"])
            .unwrap();
        session.commit().unwrap();
        assert!(!session.connection().is_autocommit());

        session.connection().execute_batch("ROLLBACK;").unwrap();
        assert_eq!(count_notes(&engine), 0);
    }

    #[test]
    fn listeners_see_parent_nesting() {
        let (_dir, engine) = setup();
        let session = Session::new(engine.connect().unwrap());
        let seen: Rc<RefCell<Vec<TransactionEnd>>> = Rc::default();
        let sink = Rc::clone(&seen);
        session.listen_transaction_end(Rc::new(
            move |_: &Session, ended: &TransactionEnd| -> DbResult<()> {
                sink.borrow_mut().push(*ended);
                Ok(())
            },
        ));

        session.begin_nested().unwrap();
        session.begin_nested().unwrap();
        session.commit().unwrap();
        session.commit().unwrap();
        session.rollback().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].nested && seen[0].parent_nested == Some(true));
        assert!(!seen[0].is_outermost_savepoint());
        assert!(seen[1].is_outermost_savepoint());
        assert_eq!(seen[2].parent_nested, None);
        assert_eq!(seen[2].outcome, TransactionOutcome::Rollback);
    }

    #[test]
    fn root_commit_expires_identity_map_but_savepoint_commit_does_not() {
        let (_dir, engine) = setup();
        let session = Session::new(engine.connect().unwrap());

        session.begin_nested().unwrap();
        session.remember("notes", 1, "cached".to_string());
        session.commit().unwrap();
        assert_eq!(
            session.cached::<String>("notes", 1).as_deref(),
            Some("cached")
        );

        session.commit().unwrap();
        assert_eq!(session.cached_count(), 0);
    }

    #[test]
    fn close_rolls_back_open_transactions_and_detaches_listeners() {
        let (_dir, engine) = setup();
        let session = Session::new(engine.connect().unwrap());
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        session.listen_transaction_end(Rc::new(
            move |_: &Session, _: &TransactionEnd| -> DbResult<()> {
                *counter.borrow_mut() += 1;
                Ok(())
            },
        ));

        session.begin_nested().unwrap();
        session
            .execute("INSERT INTO notes (body) VALUES (?1);", ["dropped"])
            .unwrap();
        session.close().unwrap();

        assert_eq!(*fired.borrow(), 0);
        assert!(!session.in_transaction());
        assert!(session.connection().is_autocommit());
        assert_eq!(count_notes(&engine), 0);
    }

    #[test]
    fn pinned_close_reopens_a_savepoint_and_keeps_listeners() {
        let (_dir, engine) = setup();
        let session = Session::new(engine.connect().unwrap());
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        session.listen_transaction_end(Rc::new(
            move |_: &Session, _: &TransactionEnd| -> DbResult<()> {
                *counter.borrow_mut() += 1;
                Ok(())
            },
        ));
        session.begin_nested().unwrap();
        session.pin();

        session
            .execute("INSERT INTO notes (body) VALUES (?1);", ["dropped"])
            .unwrap();
        session.close().unwrap();
        assert_eq!(session.savepoint_depth(), 1);

        session.commit().unwrap();
        assert_eq!(*fired.borrow(), 1);

        session.detach().unwrap();
        assert!(!session.in_transaction());
        assert!(session.connection().is_autocommit());
        assert_eq!(count_notes(&engine), 0);
    }
}

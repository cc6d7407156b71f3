//! Per-test transactional isolation.
//!
//! # Responsibility
//! - Wrap one test in an outer transaction that is always rolled back.
//! - Absorb every commit issued by code under test into a savepoint that is
//!   immediately recreated, so the outer transaction is never ended early.
//!
//! # Invariants
//! - While a scope is alive its connection holds exactly one outer
//!   transaction and, between commit boundaries, exactly one savepoint opened
//!   by the harness. Closing the session from code under test rolls back to a
//!   fresh savepoint rather than dropping it.
//! - Release runs on every exit path: explicitly through `release`, or from
//!   `Drop` when a test body panics or returns early.
//! - Scopes are `!Send`: they can never be shared between test threads.

use crate::db::{DbError, DbResult, Engine, Session, TransactionEnd};
use log::{debug, error, info};
use std::rc::Rc;

/// Transaction nesting state of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Closed,
    OuterOpen,
    SavepointOpen,
}

/// One test's transactional boundary.
#[derive(Debug)]
pub struct IsolationScope {
    session: Option<Session>,
}

/// Opens a connection, begins the outer transaction and the first savepoint.
///
/// # Errors
/// - [`DbError::Connection`] when `engine` cannot produce a connection.
pub fn acquire_scope(engine: &Engine) -> DbResult<IsolationScope> {
    let conn = engine.connect()?;
    conn.execute_batch("BEGIN;")?;

    // From here on Drop guarantees the rollback.
    let scope = IsolationScope {
        session: Some(Session::new(conn)),
    };
    let session = scope.bind_session();
    session.begin_nested()?;
    session.pin();
    session.listen_transaction_end(Rc::new(on_commit_boundary));
    session.execute_batch("SELECT 1;")?;

    debug!(
        "event=scope_acquire module=testing status=ok path={}",
        engine.path().display()
    );
    Ok(scope)
}

/// Commit-boundary policy registered on every scope session.
///
/// When the savepoint directly under the outer transaction ends, cached
/// state is expired and a fresh savepoint is opened. Any other transaction
/// end is ignored, so savepoints opened by code under test never accumulate.
pub fn on_commit_boundary(session: &Session, ended: &TransactionEnd) -> DbResult<()> {
    if ended.nested && ended.parent_nested == Some(false) {
        session.expire_all();
        session.begin_nested()?;
    }
    Ok(())
}

/// Releases `scope`; equivalent to [`IsolationScope::release`].
pub fn release_scope(scope: IsolationScope) -> DbResult<()> {
    scope.release()
}

impl IsolationScope {
    /// Session bound to this scope's connection.
    ///
    /// Every call returns the same session; no further outer transaction is
    /// ever opened.
    pub fn bind_session(&self) -> &Session {
        self.session
            .as_ref()
            .expect("scope session is present until release")
    }

    pub fn state(&self) -> ScopeState {
        match &self.session {
            None => ScopeState::Closed,
            Some(session) if session.savepoint_depth() > 0 => ScopeState::SavepointOpen,
            Some(_) => ScopeState::OuterOpen,
        }
    }

    /// Number of open savepoints on the scope connection.
    pub fn savepoint_depth(&self) -> usize {
        self.session.as_ref().map_or(0, Session::savepoint_depth)
    }

    /// Detaches the session, rolls back the outer transaction and closes the
    /// connection, in that order.
    ///
    /// # Errors
    /// - [`DbError::OuterTransactionLost`] when code under test ended the
    ///   outer transaction itself. The connection is still closed.
    pub fn release(mut self) -> DbResult<()> {
        self.release_in_place()
    }

    fn release_in_place(&mut self) -> DbResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let detached = session.detach();
        let conn = session.into_connection();
        let rolled_back = if conn.is_autocommit() {
            Err(DbError::OuterTransactionLost)
        } else {
            conn.execute_batch("ROLLBACK;").map_err(DbError::from)
        };
        let closed = conn.close();

        let result = rolled_back.and(detached).and(closed);
        match &result {
            Ok(()) => debug!("event=scope_release module=testing status=ok"),
            Err(err) => error!("event=scope_release module=testing status=error error={err}"),
        }
        result
    }
}

impl Drop for IsolationScope {
    fn drop(&mut self) {
        if self.session.is_some() {
            info!("event=scope_release module=testing status=start trigger=drop");
            let _ = self.release_in_place();
        }
    }
}

/// Runs `body` inside a fresh scope and releases it afterwards, whether the
/// body succeeds, fails or panics.
pub fn run_isolated<T, E>(
    engine: &Engine,
    body: impl FnOnce(&Session) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    let scope = acquire_scope(engine)?;
    let outcome = body(scope.bind_session());
    let released = scope.release();
    let value = outcome?;
    released?;
    Ok(value)
}

//! Process-wide test database.
//!
//! # Responsibility
//! - Reset and migrate the `testing` database once per test process.
//! - Hand out isolation scopes one at a time.
//!
//! # Invariants
//! - The reset completes before the first scope is acquired.
//! - At most one scope from a `TestDatabase` is open at any time; SQLite
//!   allows a single writer per file, so parallel test threads queue here.

use super::scope::{acquire_scope, IsolationScope};
use crate::app::{create_app, App, AppError};
use crate::db::reset::{reset_database, ResetReport};
use crate::db::{DbResult, Engine};
use log::info;
use once_cell::sync::OnceCell;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

static TEST_DATABASE: OnceCell<TestDatabase> = OnceCell::new();

/// Reset, migrated database shared by all tests of a process.
#[derive(Debug)]
pub struct TestDatabase {
    app: App,
    reset: ResetReport,
    scope_lock: Mutex<()>,
}

impl TestDatabase {
    /// Returns the process-wide database built from `create_app("testing")`,
    /// resetting it on first use.
    pub fn global() -> Result<&'static TestDatabase, AppError> {
        TEST_DATABASE.get_or_try_init(|| Self::prepare(create_app("testing")?))
    }

    /// Resets `app`'s database and rebuilds it through the migration runner.
    pub fn prepare(app: App) -> Result<Self, AppError> {
        let reset = reset_database(app.engine())?;
        info!(
            "event=test_database_ready module=testing status=ok path={} version={}",
            app.engine().path().display(),
            reset.schema_version
        );
        Ok(Self {
            app,
            reset,
            scope_lock: Mutex::new(()),
        })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn engine(&self) -> &Engine {
        self.app.engine()
    }

    /// Report of the reset that prepared this database.
    pub fn reset_report(&self) -> &ResetReport {
        &self.reset
    }

    /// Waits for any other scope to be released, then opens a new one.
    pub fn scope(&self) -> DbResult<ScopeGuard<'_>> {
        // A test that panicked still released its scope in Drop.
        let lock = self
            .scope_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let scope = acquire_scope(self.engine())?;
        Ok(ScopeGuard { scope, _lock: lock })
    }
}

/// Scope that keeps the database's scope lock until it is released.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    // Declared first: the scope is released before the lock is dropped.
    scope: IsolationScope,
    _lock: MutexGuard<'a, ()>,
}

impl ScopeGuard<'_> {
    pub fn release(self) -> DbResult<()> {
        let ScopeGuard { scope, _lock } = self;
        scope.release()
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = IsolationScope;

    fn deref(&self) -> &Self::Target {
        &self.scope
    }
}

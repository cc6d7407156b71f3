#![allow(dead_code)]

use reports_core::db::migrations::upgrade;
use reports_core::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use reports_core::repo::staff_repo::{SqliteStaffRepository, StaffRepository};
use reports_core::{Engine, NewProject, NewStaff, Project, Session, Staff};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Migrated database in a temporary directory.
pub struct TempDatabase {
    pub dir: tempfile::TempDir,
    pub engine: Engine,
}

pub fn migrated_engine() -> TempDatabase {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(dir.path().join("reports_test.sqlite3"));
    let mut conn = engine.connect().unwrap();
    upgrade(&mut conn).unwrap();
    conn.close().unwrap();
    TempDatabase { dir, engine }
}

static FIXTURE_SEQ: AtomicUsize = AtomicUsize::new(0);

fn next_suffix() -> usize {
    FIXTURE_SEQ.fetch_add(1, Ordering::Relaxed)
}

pub fn project_payload() -> NewProject {
    let mut project = NewProject::new(
        format!("New Project {}", next_suffix()),
        "New Project Description",
        "New Project Location",
        1,
        1,
    );
    project.region_id_env = Some(1);
    project.region_id_flnro = Some(4);
    project
}

pub fn staff_payload() -> NewStaff {
    NewStaff::new(
        "Andrew",
        "1111111111",
        format!("andrew{}@test.com", next_suffix()),
        3,
    )
}

/// Inserts a project through the session without committing.
pub fn new_project(session: &Session) -> Project {
    SqliteProjectRepository::new(session)
        .create_project(&project_payload())
        .unwrap()
}

/// Inserts a staff member through the session without committing.
pub fn new_staff(session: &Session) -> Staff {
    SqliteStaffRepository::new(session)
        .create_staff(&staff_payload())
        .unwrap()
}

pub fn count_rows(engine: &Engine, table: &str) -> i64 {
    let conn = engine.connect().unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

//! Project repository contracts and session-backed implementation.
//!
//! # Invariants
//! - Reads are served from the session identity map until it is expired.
//! - Inactive projects are hidden from lists unless explicitly requested.

use super::{bool_to_int, int_to_bool, RepoError, RepoResult};
use crate::db::Session;
use crate::model::project::{NewProject, Project, ProjectId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};

pub const PROJECTS_TABLE: &str = "projects";

const PROJECT_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    location,
    address,
    sub_sector_id,
    proponent_id,
    region_id_env,
    region_id_flnro,
    is_active
FROM projects";

/// Query options for listing projects.
#[derive(Debug, Clone, Default)]
pub struct ProjectListQuery {
    pub proponent_id: Option<i64>,
    pub include_inactive: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for project CRUD operations.
pub trait ProjectRepository {
    fn create_project(&self, project: &NewProject) -> RepoResult<Project>;
    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    fn list_projects(&self, query: &ProjectListQuery) -> RepoResult<Vec<Project>>;
    fn update_project(&self, project: &Project) -> RepoResult<()>;
    fn delete_project(&self, id: ProjectId) -> RepoResult<()>;
}

/// Project repository bound to one session.
pub struct SqliteProjectRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteProjectRepository<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, project: &NewProject) -> RepoResult<Project> {
        project.validate()?;

        self.session.execute(
            "INSERT INTO projects (
                name,
                description,
                location,
                address,
                sub_sector_id,
                proponent_id,
                region_id_env,
                region_id_flnro
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                project.name.as_str(),
                project.description.as_str(),
                project.location.as_str(),
                project.address.as_deref(),
                project.sub_sector_id,
                project.proponent_id,
                project.region_id_env,
                project.region_id_flnro,
            ],
        )?;

        let created = project.clone().into_project(self.session.last_insert_rowid());
        self.session
            .remember(PROJECTS_TABLE, created.id, created.clone());
        Ok(created)
    }

    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        if let Some(cached) = self.session.cached::<Project>(PROJECTS_TABLE, id) {
            return Ok(Some(cached));
        }

        let mut stmt = self
            .session
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => {
                let project = parse_project_row(row)?;
                self.session
                    .remember(PROJECTS_TABLE, project.id, project.clone());
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    fn list_projects(&self, query: &ProjectListQuery) -> RepoResult<Vec<Project>> {
        let mut sql = format!("{PROJECT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_inactive {
            sql.push_str(" AND is_active = 1");
        }
        if let Some(proponent_id) = query.proponent_id {
            sql.push_str(" AND proponent_id = ?");
            bind_values.push(Value::Integer(proponent_id));
        }

        sql.push_str(" ORDER BY name ASC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.session.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut projects = Vec::new();

        while let Some(row) = rows.next()? {
            let project = parse_project_row(row)?;
            self.session
                .remember(PROJECTS_TABLE, project.id, project.clone());
            projects.push(project);
        }

        Ok(projects)
    }

    fn update_project(&self, project: &Project) -> RepoResult<()> {
        project.validate()?;

        let changed = self.session.execute(
            "UPDATE projects
             SET
                name = ?1,
                description = ?2,
                location = ?3,
                address = ?4,
                sub_sector_id = ?5,
                proponent_id = ?6,
                region_id_env = ?7,
                region_id_flnro = ?8,
                is_active = ?9,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?10;",
            params![
                project.name.as_str(),
                project.description.as_str(),
                project.location.as_str(),
                project.address.as_deref(),
                project.sub_sector_id,
                project.proponent_id,
                project.region_id_env,
                project.region_id_flnro,
                bool_to_int(project.is_active),
                project.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "project",
                id: project.id,
            });
        }

        self.session
            .remember(PROJECTS_TABLE, project.id, project.clone());
        Ok(())
    }

    fn delete_project(&self, id: ProjectId) -> RepoResult<()> {
        let changed = self
            .session
            .execute("DELETE FROM projects WHERE id = ?1;", [id])?;
        self.session.expire(PROJECTS_TABLE, id);

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "project",
                id,
            });
        }
        Ok(())
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let project = Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        location: row.get("location")?,
        address: row.get("address")?,
        sub_sector_id: row.get("sub_sector_id")?,
        proponent_id: row.get("proponent_id")?,
        region_id_env: row.get("region_id_env")?,
        region_id_flnro: row.get("region_id_flnro")?,
        is_active: int_to_bool(PROJECTS_TABLE, "is_active", row.get("is_active")?)?,
    };
    project.validate()?;
    Ok(project)
}

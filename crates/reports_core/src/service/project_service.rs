//! Project use-case service.
//!
//! # Invariants
//! - Writes are committed through the session they were issued on; a failed
//!   write rolls the session's innermost transaction back.

use super::{ServiceError, ServiceResult};
use crate::db::Session;
use crate::model::project::{NewProject, Project, ProjectId};
use crate::repo::project_repo::{ProjectListQuery, ProjectRepository, SqliteProjectRepository};
use log::{info, warn};

/// Project service over a repository and the session that owns its writes.
pub struct ProjectService<'s, R: ProjectRepository> {
    session: &'s Session,
    repo: R,
}

impl<'s> ProjectService<'s, SqliteProjectRepository<'s>> {
    /// Builds the service with the SQLite repository bound to `session`.
    pub fn for_session(session: &'s Session) -> Self {
        Self::new(session, SqliteProjectRepository::new(session))
    }
}

impl<'s, R: ProjectRepository> ProjectService<'s, R> {
    pub fn new(session: &'s Session, repo: R) -> Self {
        Self { session, repo }
    }

    /// Inserts and commits a project.
    pub fn save_project(&self, project: &NewProject) -> ServiceResult<Project> {
        let created = match self.repo.create_project(project) {
            Ok(created) => created,
            Err(err) => {
                self.discard();
                return Err(err.into());
            }
        };
        self.session.commit().map_err(ServiceError::Commit)?;

        info!(
            "event=project_save module=service status=ok project_id={}",
            created.id
        );
        Ok(created)
    }

    /// Updates and commits a project.
    pub fn update_project(&self, project: &Project) -> ServiceResult<Project> {
        if let Err(err) = self.repo.update_project(project) {
            self.discard();
            return Err(err.into());
        }
        self.session.commit().map_err(ServiceError::Commit)?;

        self.repo
            .get_project(project.id)?
            .ok_or(ServiceError::NotFound {
                entity: "project",
                id: project.id,
            })
    }

    /// Marks a project inactive without deleting its row.
    pub fn deactivate_project(&self, id: ProjectId) -> ServiceResult<Project> {
        let mut project = self.get_project(id)?;
        project.is_active = false;
        self.update_project(&project)
    }

    pub fn delete_project(&self, id: ProjectId) -> ServiceResult<()> {
        if let Err(err) = self.repo.delete_project(id) {
            self.discard();
            return Err(err.into());
        }
        self.session.commit().map_err(ServiceError::Commit)
    }

    pub fn get_project(&self, id: ProjectId) -> ServiceResult<Project> {
        self.repo.get_project(id)?.ok_or(ServiceError::NotFound {
            entity: "project",
            id,
        })
    }

    pub fn list_projects(&self, query: &ProjectListQuery) -> ServiceResult<Vec<Project>> {
        Ok(self.repo.list_projects(query)?)
    }

    fn discard(&self) {
        if let Err(err) = self.session.rollback() {
            warn!("event=project_rollback module=service status=error error={err}");
        }
    }
}

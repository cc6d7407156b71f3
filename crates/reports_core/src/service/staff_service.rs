//! Staff use-case service.

use super::{ServiceError, ServiceResult};
use crate::db::Session;
use crate::model::staff::{NewStaff, Staff, StaffId};
use crate::repo::staff_repo::{SqliteStaffRepository, StaffRepository};
use log::{info, warn};

/// Staff service over a repository and the session that owns its writes.
pub struct StaffService<'s, R: StaffRepository> {
    session: &'s Session,
    repo: R,
}

impl<'s> StaffService<'s, SqliteStaffRepository<'s>> {
    pub fn for_session(session: &'s Session) -> Self {
        Self::new(session, SqliteStaffRepository::new(session))
    }
}

impl<'s, R: StaffRepository> StaffService<'s, R> {
    pub fn new(session: &'s Session, repo: R) -> Self {
        Self { session, repo }
    }

    /// Inserts and commits a staff member.
    pub fn save_staff(&self, staff: &NewStaff) -> ServiceResult<Staff> {
        let created = match self.repo.create_staff(staff) {
            Ok(created) => created,
            Err(err) => {
                self.discard();
                return Err(err.into());
            }
        };
        self.session.commit().map_err(ServiceError::Commit)?;

        info!(
            "event=staff_save module=service status=ok staff_id={}",
            created.id
        );
        Ok(created)
    }

    pub fn update_staff(&self, staff: &Staff) -> ServiceResult<Staff> {
        if let Err(err) = self.repo.update_staff(staff) {
            self.discard();
            return Err(err.into());
        }
        self.session.commit().map_err(ServiceError::Commit)?;
        self.get_staff(staff.id)
    }

    pub fn delete_staff(&self, id: StaffId) -> ServiceResult<()> {
        if let Err(err) = self.repo.delete_staff(id) {
            self.discard();
            return Err(err.into());
        }
        self.session.commit().map_err(ServiceError::Commit)
    }

    pub fn get_staff(&self, id: StaffId) -> ServiceResult<Staff> {
        self.repo
            .get_staff(id)?
            .ok_or(ServiceError::NotFound { entity: "staff", id })
    }

    pub fn find_by_email(&self, email: &str) -> ServiceResult<Option<Staff>> {
        Ok(self.repo.find_by_email(email)?)
    }

    pub fn list_staffs(&self, position_id: Option<i64>) -> ServiceResult<Vec<Staff>> {
        Ok(self.repo.list_staffs(position_id)?)
    }

    fn discard(&self) {
        if let Err(err) = self.session.rollback() {
            warn!("event=staff_rollback module=service status=error error={err}");
        }
    }
}

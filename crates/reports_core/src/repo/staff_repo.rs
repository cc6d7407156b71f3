//! Staff repository contracts and session-backed implementation.
//!
//! # Invariants
//! - Email addresses are stored lowercase and are unique.

use super::{bool_to_int, int_to_bool, RepoError, RepoResult};
use crate::db::Session;
use crate::model::staff::{NewStaff, Staff, StaffId};
use rusqlite::{params, Row};

pub const STAFFS_TABLE: &str = "staffs";

const STAFF_SELECT_SQL: &str = "SELECT
    id,
    name,
    phone,
    email,
    position_id,
    is_active
FROM staffs";

/// Repository interface for staff CRUD operations.
pub trait StaffRepository {
    fn create_staff(&self, staff: &NewStaff) -> RepoResult<Staff>;
    fn get_staff(&self, id: StaffId) -> RepoResult<Option<Staff>>;
    fn find_by_email(&self, email: &str) -> RepoResult<Option<Staff>>;
    fn list_staffs(&self, position_id: Option<i64>) -> RepoResult<Vec<Staff>>;
    fn update_staff(&self, staff: &Staff) -> RepoResult<()>;
    fn delete_staff(&self, id: StaffId) -> RepoResult<()>;
}

/// Staff repository bound to one session.
pub struct SqliteStaffRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteStaffRepository<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    fn load_one(&self, sql: &str, key: &dyn rusqlite::ToSql) -> RepoResult<Option<Staff>> {
        let mut stmt = self.session.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => {
                let staff = parse_staff_row(row)?;
                self.session.remember(STAFFS_TABLE, staff.id, staff.clone());
                Ok(Some(staff))
            }
            None => Ok(None),
        }
    }
}

impl StaffRepository for SqliteStaffRepository<'_> {
    fn create_staff(&self, staff: &NewStaff) -> RepoResult<Staff> {
        staff.validate()?;

        let mut normalized = staff.clone();
        normalized.email = normalize_email(&staff.email);

        self.session.execute(
            "INSERT INTO staffs (name, phone, email, position_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                normalized.name.as_str(),
                normalized.phone.as_str(),
                normalized.email.as_str(),
                normalized.position_id,
            ],
        )?;

        let created = normalized.into_staff(self.session.last_insert_rowid());
        self.session
            .remember(STAFFS_TABLE, created.id, created.clone());
        Ok(created)
    }

    fn get_staff(&self, id: StaffId) -> RepoResult<Option<Staff>> {
        if let Some(cached) = self.session.cached::<Staff>(STAFFS_TABLE, id) {
            return Ok(Some(cached));
        }
        self.load_one(&format!("{STAFF_SELECT_SQL} WHERE id = ?1;"), &id)
    }

    fn find_by_email(&self, email: &str) -> RepoResult<Option<Staff>> {
        let email = normalize_email(email);
        self.load_one(&format!("{STAFF_SELECT_SQL} WHERE email = ?1;"), &email)
    }

    fn list_staffs(&self, position_id: Option<i64>) -> RepoResult<Vec<Staff>> {
        let mut stmt = self.session.prepare(&format!(
            "{STAFF_SELECT_SQL}
             WHERE is_active = 1
               AND (?1 IS NULL OR position_id = ?1)
             ORDER BY name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([position_id])?;
        let mut staffs = Vec::new();

        while let Some(row) = rows.next()? {
            let staff = parse_staff_row(row)?;
            self.session.remember(STAFFS_TABLE, staff.id, staff.clone());
            staffs.push(staff);
        }

        Ok(staffs)
    }

    fn update_staff(&self, staff: &Staff) -> RepoResult<()> {
        staff.validate()?;

        let mut normalized = staff.clone();
        normalized.email = normalize_email(&staff.email);

        let changed = self.session.execute(
            "UPDATE staffs
             SET
                name = ?1,
                phone = ?2,
                email = ?3,
                position_id = ?4,
                is_active = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?6;",
            params![
                normalized.name.as_str(),
                normalized.phone.as_str(),
                normalized.email.as_str(),
                normalized.position_id,
                bool_to_int(normalized.is_active),
                normalized.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "staff",
                id: staff.id,
            });
        }

        self.session
            .remember(STAFFS_TABLE, normalized.id, normalized);
        Ok(())
    }

    fn delete_staff(&self, id: StaffId) -> RepoResult<()> {
        let changed = self
            .session
            .execute("DELETE FROM staffs WHERE id = ?1;", [id])?;
        self.session.expire(STAFFS_TABLE, id);

        if changed == 0 {
            return Err(RepoError::NotFound { entity: "staff", id });
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn parse_staff_row(row: &Row<'_>) -> RepoResult<Staff> {
    let staff = Staff {
        id: row.get("id")?,
        name: row.get("name")?,
        phone: row.get("phone")?,
        email: row.get("email")?,
        position_id: row.get("position_id")?,
        is_active: int_to_bool(STAFFS_TABLE, "is_active", row.get("is_active")?)?,
    };
    staff.validate()?;
    Ok(staff)
}

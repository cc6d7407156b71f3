//! Staff records.

use super::{require_text, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub type StaffId = i64;

const NAME_MAX: usize = 150;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ().\-]{5,18}[0-9]$").expect("valid phone regex"));

/// Persisted staff row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub position_id: i64,
    pub is_active: bool,
}

/// Insert payload for a staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStaff {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub position_id: i64,
}

impl NewStaff {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        position_id: i64,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            position_id,
        }
    }

    /// Validates fields. Email is compared case-insensitively downstream, so
    /// only its shape is checked here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.name, &self.phone, &self.email)
    }

    pub fn into_staff(self, id: StaffId) -> Staff {
        Staff {
            id,
            name: self.name,
            phone: self.phone,
            email: self.email,
            position_id: self.position_id,
            is_active: true,
        }
    }
}

impl Staff {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.name, &self.phone, &self.email)
    }
}

fn validate_fields(name: &str, phone: &str, email: &str) -> Result<(), ValidationError> {
    require_text("name", name, NAME_MAX)?;
    if !PHONE_RE.is_match(phone.trim()) {
        return Err(ValidationError::InvalidPhone(phone.to_string()));
    }
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::NewStaff;
    use crate::model::ValidationError;

    #[test]
    fn accepts_plain_ten_digit_phone() {
        let staff = NewStaff::new("Andrew", "1111111111", "andrew@test.com", 3);
        assert!(staff.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_email_and_phone() {
        let bad_email = NewStaff::new("Andrew", "1111111111", "andrew.test.com", 3);
        assert!(matches!(
            bad_email.validate(),
            Err(ValidationError::InvalidEmail(_))
        ));

        let bad_phone = NewStaff::new("Andrew", "call me", "andrew@test.com", 3);
        assert!(matches!(
            bad_phone.validate(),
            Err(ValidationError::InvalidPhone(_))
        ));
    }

    #[test]
    fn rejects_blank_name() {
        let staff = NewStaff::new("   ", "1111111111", "andrew@test.com", 3);
        assert_eq!(staff.validate(), Err(ValidationError::EmptyField("name")));
    }
}

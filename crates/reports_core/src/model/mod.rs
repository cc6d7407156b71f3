//! Domain model for the reports service.
//!
//! # Responsibility
//! - Define the records persisted by repositories (`projects`, `staffs`).
//! - Validate user-supplied fields before they reach SQL.
//!
//! # Invariants
//! - Persisted records are identified by their database row id.
//! - Deactivation is a flag, rows are never reused for another record.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod project;
pub mod staff;

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    FieldTooLong { field: &'static str, max: usize },
    InvalidEmail(String),
    InvalidPhone(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "`{field}` must not be empty"),
            Self::FieldTooLong { field, max } => {
                write!(f, "`{field}` must be at most {max} characters")
            }
            Self::InvalidEmail(value) => write!(f, "invalid email address `{value}`"),
            Self::InvalidPhone(value) => write!(f, "invalid phone number `{value}`"),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::FieldTooLong { field, max });
    }
    Ok(())
}

//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own the unit-of-work boundary: every successful write ends with a
//!   session commit.

use crate::db::DbError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod project_service;
pub mod staff_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error returned by service APIs.
#[derive(Debug)]
pub enum ServiceError {
    NotFound { entity: &'static str, id: i64 },
    Repo(RepoError),
    /// The session failed to commit the unit of work.
    Commit(DbError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Commit(err) => write!(f, "commit failed: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Commit(err) => Some(err),
            Self::NotFound { .. } => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Repo(other),
        }
    }
}

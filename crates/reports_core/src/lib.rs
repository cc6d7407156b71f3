//! Core library of the reports service.
//! Owns the schema, the unit-of-work session and the test isolation harness.

pub mod app;
pub mod bus;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod testing;

pub use app::{create_app, App, AppError};
pub use config::{AppConfig, ConfigError, Environment};
pub use db::{DbError, DbResult, Engine, Session};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::project::{NewProject, Project, ProjectId};
pub use model::staff::{NewStaff, Staff, StaffId};
pub use model::ValidationError;
pub use repo::{RepoError, RepoResult};
pub use service::project_service::ProjectService;
pub use service::staff_service::StaffService;
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

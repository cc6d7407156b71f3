//! Application factory.
//!
//! # Responsibility
//! - Build a configured application instance for a named environment.
//! - Expose the connection source and session construction to callers.
//!
//! # Invariants
//! - Sessions are passed explicitly to services; there is no process-wide
//!   session slot to override.

use crate::config::{AppConfig, ConfigError, Environment};
use crate::db::migrations::{current_version, upgrade};
use crate::db::{DbError, DbResult, Engine, Session};
use crate::logging::{init_logging, LoggingError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Application construction failure.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Db(DbError),
    Logging(LoggingError),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Logging(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for AppError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<LoggingError> for AppError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

/// Configured service instance.
#[derive(Debug, Clone)]
pub struct App {
    config: AppConfig,
    engine: Engine,
}

/// Creates an application for `environment_name` (`development`, `testing`
/// or `production`) using the process environment.
pub fn create_app(environment_name: &str) -> Result<App, AppError> {
    let environment: Environment = environment_name.parse()?;
    let config = AppConfig::from_env(environment)?;
    Ok(App::from_config(config))
}

impl App {
    pub fn from_config(config: AppConfig) -> Self {
        let engine = Engine::new(config.database_path.clone());
        info!(
            "event=app_create module=app status=ok environment={} database={}",
            config.environment.as_str(),
            config.database_path.display()
        );
        Self { config, engine }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    /// Connection source for the configured database.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Opens a session on a fresh connection.
    pub fn open_session(&self) -> DbResult<Session> {
        Ok(Session::new(self.engine.connect()?))
    }

    /// Applies pending migrations and returns the resulting schema version.
    pub fn upgrade(&self) -> DbResult<u32> {
        let mut conn = self.engine.connect()?;
        upgrade(&mut conn)?;
        let version = current_version(&conn)?;
        conn.close()?;
        Ok(version)
    }

    /// Starts file logging when a log directory is configured.
    ///
    /// Returns `false` when no directory is configured and logging stays off.
    pub fn init_logging(&self) -> Result<bool, AppError> {
        match &self.config.log_dir {
            Some(dir) => {
                init_logging(self.config.log_level, dir)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

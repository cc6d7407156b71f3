//! Environment-driven application configuration.
//!
//! # Responsibility
//! - Resolve per-environment settings (database file, logging).
//! - Keep the test database distinct from the application database.
//!
//! # Invariants
//! - `from_lookup` never touches process-global state; only `from_env`
//!   reads the process environment (after loading an optional `.env`).
//! - The `testing` environment never resolves to the configured
//!   application database path.
//!
//! # Test database location
//! Without `REPORTS_TEST_DATABASE_PATH`, every test process gets its own
//! `reports_test_<pid>.sqlite3` in the system temp directory. Those files are
//! not deleted when the process exits. Set `REPORTS_TEST_DATABASE_PATH` to a
//! fixed file to reuse one database across runs; it is reset on first use by
//! every process.

use crate::logging::{default_log_level, normalize_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

pub const DATABASE_PATH_ENV: &str = "REPORTS_DATABASE_PATH";
/// Overrides the per-process default test database file.
pub const TEST_DATABASE_PATH_ENV: &str = "REPORTS_TEST_DATABASE_PATH";
pub const LOG_LEVEL_ENV: &str = "REPORTS_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "REPORTS_LOG_DIR";

const DEFAULT_DATABASE_FILE: &str = "reports.sqlite3";

/// Configuration failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownEnvironment(String),
    MissingEnv(&'static str),
    Invalid { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEnvironment(name) => write!(
                f,
                "unknown environment `{name}`; expected development|testing|production"
            ),
            Self::MissingEnv(key) => write!(f, "Missing env variable: {key}"),
            Self::Invalid { key, message } => write!(f, "invalid `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Deployment environment selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "testing" => Ok(Self::Testing),
            "production" => Ok(Self::Production),
            _ => Err(ConfigError::UnknownEnvironment(value.to_string())),
        }
    }
}

/// Reads one variable from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolved application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_path: PathBuf,
    pub log_level: &'static str,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `.env` (if present) and resolves settings from the process
    /// environment.
    pub fn from_env(environment: Environment) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(environment, process_env)
    }

    /// Resolves settings from an explicit key lookup.
    pub fn from_lookup(
        environment: Environment,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let app_database = read(DATABASE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE));

        let database_path = match environment {
            Environment::Testing => {
                let path = read(TEST_DATABASE_PATH_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(default_test_database);
                if path == app_database {
                    return Err(ConfigError::Invalid {
                        key: TEST_DATABASE_PATH_ENV,
                        message: format!("must differ from {DATABASE_PATH_ENV}"),
                    });
                }
                path
            }
            Environment::Development | Environment::Production => app_database,
        };

        let log_level = match read(LOG_LEVEL_ENV) {
            Some(level) => normalize_level(&level).map_err(|err| ConfigError::Invalid {
                key: LOG_LEVEL_ENV,
                message: err.to_string(),
            })?,
            None => default_log_level(),
        };

        let log_dir = match read(LOG_DIR_ENV).map(PathBuf::from) {
            Some(dir) if !dir.is_absolute() => {
                return Err(ConfigError::Invalid {
                    key: LOG_DIR_ENV,
                    message: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
            other => other,
        };

        Ok(Self {
            environment,
            database_path,
            log_level,
            log_dir,
        })
    }
}

/// Per-process test database used when `REPORTS_TEST_DATABASE_PATH` is unset.
pub fn default_test_database() -> PathBuf {
    std::env::temp_dir().join(format!("reports_test_{}.sqlite3", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::{
        default_test_database, AppConfig, ConfigError, Environment, DATABASE_PATH_ENV,
        TEST_DATABASE_PATH_ENV,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn environment_names_parse_case_insensitively() {
        assert_eq!("Testing".parse::<Environment>().unwrap(), Environment::Testing);
        assert_eq!(
            " production ".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert!(matches!(
            "staging".parse::<Environment>(),
            Err(ConfigError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn testing_uses_its_own_database() {
        let env = lookup(&[
            (DATABASE_PATH_ENV, "/srv/reports.sqlite3"),
            (TEST_DATABASE_PATH_ENV, "/tmp/reports_test.sqlite3"),
        ]);
        let testing = AppConfig::from_lookup(Environment::Testing, &env).unwrap();
        let development = AppConfig::from_lookup(Environment::Development, &env).unwrap();

        assert_eq!(testing.database_path, PathBuf::from("/tmp/reports_test.sqlite3"));
        assert_eq!(development.database_path, PathBuf::from("/srv/reports.sqlite3"));
    }

    #[test]
    fn testing_defaults_to_a_per_process_temp_file() {
        let config = AppConfig::from_lookup(Environment::Testing, lookup(&[])).unwrap();

        assert_eq!(config.database_path, default_test_database());
        assert!(config.database_path.starts_with(std::env::temp_dir()));
        let file_name = config.database_path.file_name().unwrap().to_string_lossy();
        assert_eq!(
            file_name,
            format!("reports_test_{}.sqlite3", std::process::id())
        );
    }

    #[test]
    fn blank_test_database_override_falls_back_to_the_default() {
        let env = lookup(&[(TEST_DATABASE_PATH_ENV, "   ")]);
        let config = AppConfig::from_lookup(Environment::Testing, env).unwrap();
        assert_eq!(config.database_path, default_test_database());
    }

    #[test]
    fn testing_rejects_the_application_database() {
        let env = lookup(&[
            (DATABASE_PATH_ENV, "/srv/reports.sqlite3"),
            (TEST_DATABASE_PATH_ENV, "/srv/reports.sqlite3"),
        ]);
        let err = AppConfig::from_lookup(Environment::Testing, env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: TEST_DATABASE_PATH_ENV,
                ..
            }
        ));
    }

    #[test]
    fn log_settings_are_validated() {
        let bad_level = lookup(&[("REPORTS_LOG_LEVEL", "chatty")]);
        assert!(AppConfig::from_lookup(Environment::Production, bad_level).is_err());

        let relative_dir = lookup(&[("REPORTS_LOG_DIR", "logs")]);
        assert!(AppConfig::from_lookup(Environment::Production, relative_dir).is_err());

        let ok = lookup(&[("REPORTS_LOG_LEVEL", "WARN")]);
        let config = AppConfig::from_lookup(Environment::Production, ok).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, None);
    }
}

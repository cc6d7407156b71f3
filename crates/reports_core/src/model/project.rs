//! Project records.
//!
//! # Invariants
//! - `name`, `description` and `location` are non-blank.
//! - `address` is optional free text (added by schema version 2).

use super::{require_text, ValidationError};
use serde::{Deserialize, Serialize};

pub type ProjectId = i64;

const NAME_MAX: usize = 150;
const TEXT_MAX: usize = 2000;

/// Persisted project row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub location: String,
    pub address: Option<String>,
    pub sub_sector_id: i64,
    pub proponent_id: i64,
    pub region_id_env: Option<i64>,
    pub region_id_flnro: Option<i64>,
    pub is_active: bool,
}

/// Insert payload for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub address: Option<String>,
    pub sub_sector_id: i64,
    pub proponent_id: i64,
    #[serde(default)]
    pub region_id_env: Option<i64>,
    #[serde(default)]
    pub region_id_flnro: Option<i64>,
}

impl NewProject {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        location: impl Into<String>,
        sub_sector_id: i64,
        proponent_id: i64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            location: location.into(),
            address: None,
            sub_sector_id,
            proponent_id,
            region_id_env: None,
            region_id_flnro: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.name, &self.description, &self.location)
    }

    /// Materializes the persisted record once the row id is known.
    pub fn into_project(self, id: ProjectId) -> Project {
        Project {
            id,
            name: self.name,
            description: self.description,
            location: self.location,
            address: self.address,
            sub_sector_id: self.sub_sector_id,
            proponent_id: self.proponent_id,
            region_id_env: self.region_id_env,
            region_id_flnro: self.region_id_flnro,
            is_active: true,
        }
    }
}

impl Project {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.name, &self.description, &self.location)
    }
}

fn validate_fields(name: &str, description: &str, location: &str) -> Result<(), ValidationError> {
    require_text("name", name, NAME_MAX)?;
    require_text("description", description, TEXT_MAX)?;
    require_text("location", location, TEXT_MAX)?;
    Ok(())
}

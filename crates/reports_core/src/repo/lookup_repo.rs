//! Read-only access to seeded lookup tables.

use super::RepoResult;
use crate::db::Session;
use serde::{Deserialize, Serialize};

/// Lookup tables seeded by the initial migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTable {
    Regions,
    SubSectors,
    Proponents,
    Positions,
}

impl LookupTable {
    fn table_name(self) -> &'static str {
        match self {
            Self::Regions => "regions",
            Self::SubSectors => "sub_sectors",
            Self::Proponents => "proponents",
            Self::Positions => "positions",
        }
    }
}

/// One `(id, name)` lookup entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupItem {
    pub id: i64,
    pub name: String,
}

/// Lists lookup entries ordered by id.
pub fn list_lookup(session: &Session, table: LookupTable) -> RepoResult<Vec<LookupItem>> {
    let mut stmt = session.prepare(&format!(
        "SELECT id, name FROM {} ORDER BY id ASC;",
        table.table_name()
    ))?;
    let mut rows = stmt.query([])?;
    let mut items = Vec::new();

    while let Some(row) = rows.next()? {
        items.push(LookupItem {
            id: row.get("id")?,
            name: row.get("name")?,
        });
    }

    Ok(items)
}

//! Shared type definitions for the reference store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Checklist, Coordinates, LocationStatus, Unit};

/// Errors specific to reference store operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from the `projects` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProject {
    pub name: String,
    pub owner: String,
    pub created_at: String,
}

/// A row from the `contractors` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContractor {
    pub name: String,
    pub location: String,
    pub created_at: String,
}

/// A row from the `materials` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMaterial {
    pub name: String,
    pub default_unit: Unit,
    pub created_at: String,
}

/// A row from the `project_locations` table, with the serialized columns
/// already decoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProjectLocation {
    pub id: i64,
    pub project_name: String,
    pub address: String,
    pub status: LocationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(serialize_with = "serialize_checklist")]
    pub checklist: Checklist,
    pub notes: String,
    pub date_added: String,
}

fn serialize_checklist<S>(checklist: &Checklist, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let entries = checklist.entries();
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (step, done) in entries {
        map.serialize_entry(step, &done)?;
    }
    map.end()
}

//! Queries for the project_locations table.
//!
//! Locations are keyed by (project, address); re-adding the same address to
//! the same project is a no-op. Coordinates and checklist are stored as JSON
//! text and decoded leniently, so a hand-edited or partially written cell
//! degrades to "no coordinates" or "nothing done" instead of a read error.

use rusqlite::{params, OptionalExtension, Row};

use super::{DbError, DbProjectLocation, ReferenceDb};
use crate::types::{Checklist, LocationStatus};

fn map_location_row(row: &Row) -> rusqlite::Result<DbProjectLocation> {
    let status_raw: String = row.get(3)?;
    let coords_raw: Option<String> = row.get(4)?;
    let checklist_raw: Option<String> = row.get(5)?;
    Ok(DbProjectLocation {
        id: row.get(0)?,
        project_name: row.get(1)?,
        address: row.get(2)?,
        status: LocationStatus::parse(&status_raw).unwrap_or(LocationStatus::NotStarted),
        coordinates: coords_raw.and_then(|s| serde_json::from_str(&s).ok()),
        checklist: checklist_raw
            .map(|s| Checklist::from_json(&s))
            .unwrap_or_default(),
        notes: row.get(6)?,
        date_added: row.get(7)?,
    })
}

const LOCATION_COLUMNS: &str =
    "id, project_name, address, status, coordinates, checklist, notes, date_added";

impl ReferenceDb {
    /// Insert a location row. Returns false when (project, address) already
    /// exists; the stored row is left untouched. `location.id` is ignored,
    /// the database assigns it.
    pub fn insert_location(&self, location: &DbProjectLocation) -> Result<bool, DbError> {
        let coords_json = location
            .coordinates
            .as_ref()
            .and_then(|c| serde_json::to_string(c).ok());
        let changed = self.conn_ref().execute(
            "INSERT OR IGNORE INTO project_locations
             (project_name, address, status, coordinates, checklist, notes, date_added)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                location.project_name,
                location.address,
                location.status.as_str(),
                coords_json,
                location.checklist.to_json(),
                location.notes,
                location.date_added,
            ],
        )?;
        Ok(changed > 0)
    }

    /// All locations for a project, in the order they were added.
    pub fn get_locations(&self, project: &str) -> Result<Vec<DbProjectLocation>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {LOCATION_COLUMNS} FROM project_locations WHERE project_name = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project], map_location_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_location(
        &self,
        project: &str,
        address: &str,
    ) -> Result<Option<DbProjectLocation>, DbError> {
        let location = self
            .conn_ref()
            .query_row(
                &format!(
                    "SELECT {LOCATION_COLUMNS} FROM project_locations
                     WHERE project_name = ?1 AND address = ?2"
                ),
                params![project, address],
                map_location_row,
            )
            .optional()?;
        Ok(location)
    }

    /// Returns false when no such location exists.
    pub fn update_location_status(
        &self,
        project: &str,
        address: &str,
        status: LocationStatus,
    ) -> Result<bool, DbError> {
        let changed = self.conn_ref().execute(
            "UPDATE project_locations SET status = ?3 WHERE project_name = ?1 AND address = ?2",
            params![project, address, status.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn update_location_notes(
        &self,
        project: &str,
        address: &str,
        notes: &str,
    ) -> Result<bool, DbError> {
        let changed = self.conn_ref().execute(
            "UPDATE project_locations SET notes = ?3 WHERE project_name = ?1 AND address = ?2",
            params![project, address, notes],
        )?;
        Ok(changed > 0)
    }

    pub fn update_location_checklist(
        &self,
        project: &str,
        address: &str,
        checklist: &Checklist,
    ) -> Result<bool, DbError> {
        let changed = self.conn_ref().execute(
            "UPDATE project_locations SET checklist = ?3 WHERE project_name = ?1 AND address = ?2",
            params![project, address, checklist.to_json()],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_location(&self, project: &str, address: &str) -> Result<bool, DbError> {
        let changed = self.conn_ref().execute(
            "DELETE FROM project_locations WHERE project_name = ?1 AND address = ?2",
            params![project, address],
        )?;
        Ok(changed > 0)
    }
}

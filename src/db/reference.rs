//! Queries for the projects, contractors, and materials reference tables.
//!
//! All three tables share the same shape of API: an idempotent add that
//! reports whether a row was actually inserted, a point lookup, and a sorted
//! listing for dropdowns. First write wins; re-adding an existing name
//! never overwrites what is already stored.

use chrono::Local;
use rusqlite::{params, OptionalExtension, Row};

use super::{DbContractor, DbError, DbMaterial, DbProject, ReferenceDb};
use crate::types::Unit;

fn map_project_row(row: &Row) -> rusqlite::Result<DbProject> {
    Ok(DbProject {
        name: row.get(0)?,
        owner: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn map_contractor_row(row: &Row) -> rusqlite::Result<DbContractor> {
    Ok(DbContractor {
        name: row.get(0)?,
        location: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn map_material_row(row: &Row) -> rusqlite::Result<DbMaterial> {
    let unit_raw: String = row.get(1)?;
    Ok(DbMaterial {
        name: row.get(0)?,
        default_unit: Unit::parse(&unit_raw).unwrap_or(Unit::Each),
        created_at: row.get(2)?,
    })
}

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl ReferenceDb {
    /// Record a project if it is not already known. Returns true when a row
    /// was inserted, false when the name already existed.
    pub fn add_project(&self, name: &str, owner: &str) -> Result<bool, DbError> {
        let changed = self.conn_ref().execute(
            "INSERT OR IGNORE INTO projects (name, owner, created_at) VALUES (?1, ?2, ?3)",
            params![name, owner, now_stamp()],
        )?;
        Ok(changed > 0)
    }

    pub fn get_project(&self, name: &str) -> Result<Option<DbProject>, DbError> {
        let project = self
            .conn_ref()
            .query_row(
                "SELECT name, owner, created_at FROM projects WHERE name = ?1",
                params![name],
                map_project_row,
            )
            .optional()?;
        Ok(project)
    }

    /// Owner on file for a project, if the project is known.
    pub fn get_project_owner(&self, name: &str) -> Result<Option<String>, DbError> {
        Ok(self.get_project(name)?.map(|p| p.owner))
    }

    pub fn get_all_projects(&self) -> Result<Vec<DbProject>, DbError> {
        let mut stmt = self
            .conn_ref()
            .prepare("SELECT name, owner, created_at FROM projects ORDER BY name")?;
        let rows = stmt.query_map([], map_project_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Record a contractor if not already known. First write wins.
    pub fn add_contractor(&self, name: &str, location: &str) -> Result<bool, DbError> {
        let changed = self.conn_ref().execute(
            "INSERT OR IGNORE INTO contractors (name, location, created_at) VALUES (?1, ?2, ?3)",
            params![name, location, now_stamp()],
        )?;
        Ok(changed > 0)
    }

    pub fn get_contractor(&self, name: &str) -> Result<Option<DbContractor>, DbError> {
        let contractor = self
            .conn_ref()
            .query_row(
                "SELECT name, location, created_at FROM contractors WHERE name = ?1",
                params![name],
                map_contractor_row,
            )
            .optional()?;
        Ok(contractor)
    }

    pub fn get_contractor_location(&self, name: &str) -> Result<Option<String>, DbError> {
        Ok(self.get_contractor(name)?.map(|c| c.location))
    }

    pub fn get_all_contractors(&self) -> Result<Vec<DbContractor>, DbError> {
        let mut stmt = self
            .conn_ref()
            .prepare("SELECT name, location, created_at FROM contractors ORDER BY name")?;
        let rows = stmt.query_map([], map_contractor_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Record a material and its default unit if not already known.
    pub fn add_material(&self, name: &str, default_unit: Unit) -> Result<bool, DbError> {
        let changed = self.conn_ref().execute(
            "INSERT OR IGNORE INTO materials (name, default_unit, created_at) VALUES (?1, ?2, ?3)",
            params![name, default_unit.label(), now_stamp()],
        )?;
        Ok(changed > 0)
    }

    pub fn get_material(&self, name: &str) -> Result<Option<DbMaterial>, DbError> {
        let material = self
            .conn_ref()
            .query_row(
                "SELECT name, default_unit, created_at FROM materials WHERE name = ?1",
                params![name],
                map_material_row,
            )
            .optional()?;
        Ok(material)
    }

    pub fn get_all_materials(&self) -> Result<Vec<DbMaterial>, DbError> {
        let mut stmt = self
            .conn_ref()
            .prepare("SELECT name, default_unit, created_at FROM materials ORDER BY name")?;
        let rows = stmt.query_map([], map_material_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

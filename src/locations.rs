//! Per-project location tracking.
//!
//! Locations live only in the local store; the ledger knows nothing about
//! them. Adding a location geocodes the address best-effort, so a failed or
//! disabled geocoder just means the pin has no coordinates.

use chrono::Local;

use crate::db::{DbError, DbProjectLocation, ReferenceDb};
use crate::geocode::Geocoder;
use crate::types::{Checklist, LocationStatus};

pub struct LocationTracker {
    db: ReferenceDb,
    geocoder: Box<dyn Geocoder>,
}

impl LocationTracker {
    pub fn new(db: ReferenceDb, geocoder: Box<dyn Geocoder>) -> Self {
        Self { db, geocoder }
    }

    /// Add an address to a project with a fresh checklist and Not Started
    /// status. Returns false for a blank address or one already tracked for
    /// this project.
    pub async fn add_location(
        &self,
        project: &str,
        address: &str,
        notes: &str,
    ) -> Result<bool, DbError> {
        let address = address.trim();
        if address.is_empty() {
            log::debug!("ignoring blank address for {project:?}");
            return Ok(false);
        }

        let coordinates = self.geocoder.geocode(address).await;
        if coordinates.is_none() {
            log::debug!("no coordinates for {address:?}");
        }

        let location = DbProjectLocation {
            id: 0,
            project_name: project.to_string(),
            address: address.to_string(),
            status: LocationStatus::NotStarted,
            coordinates,
            checklist: Checklist::new(),
            notes: notes.to_string(),
            date_added: Local::now().format("%Y-%m-%d").to_string(),
        };
        self.db.insert_location(&location)
    }

    pub fn locations(&self, project: &str) -> Result<Vec<DbProjectLocation>, DbError> {
        self.db.get_locations(project)
    }

    pub fn location(
        &self,
        project: &str,
        address: &str,
    ) -> Result<Option<DbProjectLocation>, DbError> {
        self.db.get_location(project, address)
    }

    /// Returns false when the location is unknown.
    pub fn update_status(
        &self,
        project: &str,
        address: &str,
        status: LocationStatus,
    ) -> Result<bool, DbError> {
        self.db.update_location_status(project, address, status)
    }

    pub fn update_notes(&self, project: &str, address: &str, notes: &str) -> Result<bool, DbError> {
        self.db.update_location_notes(project, address, notes)
    }

    /// Flip one checklist step. Returns false for an unknown location or a
    /// step name outside the fixed set; other steps keep their flags.
    pub fn update_checklist_step(
        &self,
        project: &str,
        address: &str,
        step: &str,
        done: bool,
    ) -> Result<bool, DbError> {
        let Some(location) = self.db.get_location(project, address)? else {
            return Ok(false);
        };
        let mut checklist = location.checklist;
        if !checklist.set(step, done) {
            log::debug!("unknown checklist step {step:?}");
            return Ok(false);
        }
        self.db.update_location_checklist(project, address, &checklist)
    }

    pub fn delete_location(&self, project: &str, address: &str) -> Result<bool, DbError> {
        self.db.delete_location(project, address)
    }
}

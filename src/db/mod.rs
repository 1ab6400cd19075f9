//! SQLite-backed reference store for projects, contractors, materials, and
//! project locations.
//!
//! The database lives at `~/.bidledger/bidledger.db` and mirrors the reference
//! data the spreadsheet ledger accumulates. The ledger is the durable layer;
//! SQLite exists so dropdowns and location tracking never pay a network round
//! trip. Rows here are written after the ledger write succeeds, so a crash
//! between the two can leave the mirror behind, and the ledger wins on conflict.

use std::path::PathBuf;

use rusqlite::Connection;

use crate::migrations::run_migrations;

pub mod types;
pub use types::*;

pub mod locations;
pub mod reference;

pub struct ReferenceDb {
    conn: Connection,
}

impl ReferenceDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Resolve the default database path (`~/.bidledger/bidledger.db`).
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".bidledger").join("bidledger.db"))
    }

    /// Open (or create) the reference database at the default location.
    pub fn open() -> Result<Self, DbError> {
        Self::open_at(&Self::default_path()?)
    }

    /// Open (or create) the reference database at a specific path.
    /// Used by tests and by configs that relocate the database.
    pub fn open_at(path: &std::path::Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
        }

        let conn = Connection::open(path)?;

        // WAL keeps readers unblocked while the sync pipeline mirrors rows.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        run_migrations(&conn).map_err(|e| DbError::Migration(e.to_string()))?;

        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self { conn })
    }
}

//! Dual-store engine for a construction bid tracker.
//!
//! Bids are recorded in a remote spreadsheet workbook (the durable,
//! rate-limited store) and mirrored into a local SQLite reference store that
//! backs dropdowns and per-project location tracking. `sync::BidEngine`
//! drives the staged submission pipeline across both; `stats` derives
//! pricing aggregates from cached ledger snapshots.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod geocode;
pub mod ledger;
pub mod locations;
mod migrations;
pub mod stats;
pub mod sync;
pub mod types;

//! Core domain records for bid tracking.
//!
//! Ledger rows arrive as untyped cell strings; everything past the decode
//! boundary works with these typed records instead (see `ledger::decode`).

use serde::{Deserialize, Serialize};

/// Timestamp format for the `Date` column of ledger rows.
pub const BID_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fixed ordered checklist steps tracked per project location.
pub const CHECKLIST_STEPS: &[&str] = &[
    "Site Survey",
    "Bid Requested",
    "Bid Received",
    "Contract Signed",
    "Work Complete",
];

/// Measurement units a bid line can be quoted in.
///
/// The ledger stores the display label ("SF", "SY", "LF", "Unit"); `Each`
/// is the per-item unit the original data calls "Unit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "SF")]
    Sf,
    #[serde(rename = "SY")]
    Sy,
    #[serde(rename = "LF")]
    Lf,
    #[serde(rename = "Unit")]
    Each,
}

impl Unit {
    pub const ALL: &'static [Unit] = &[Unit::Sf, Unit::Sy, Unit::Lf, Unit::Each];

    /// The label used in ledger cells and UI dropdowns.
    pub fn label(&self) -> &'static str {
        match self {
            Unit::Sf => "SF",
            Unit::Sy => "SY",
            Unit::Lf => "LF",
            Unit::Each => "Unit",
        }
    }

    /// Parse a ledger cell into a unit. Case-insensitive, whitespace-trimmed.
    pub fn parse(raw: &str) -> Option<Unit> {
        let trimmed = raw.trim();
        Unit::ALL
            .iter()
            .copied()
            .find(|u| u.label().eq_ignore_ascii_case(trimmed))
    }
}

/// A bid as entered by the user, before the engine stamps date and total.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidSubmission {
    pub contractor: String,
    pub project_name: String,
    pub project_owner: String,
    pub location: String,
    pub unit_number: String,
    pub material: String,
    pub unit: Unit,
    pub quantity: f64,
    pub price: f64,
}

/// A decoded ledger row.
///
/// `total` is always recomputed as `quantity * price` at write time; rows
/// read back from the ledger carry whatever the ledger holds. Project-table
/// rows have no owner column, so `project_owner` is empty for those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    pub date: String,
    pub contractor: String,
    pub project_name: String,
    pub project_owner: String,
    pub location: String,
    pub unit_number: String,
    pub material: String,
    pub unit: Unit,
    pub quantity: f64,
    pub price: f64,
    pub total: f64,
}

/// A row of the ledger's materials catalog table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialEntry {
    pub name: String,
    pub default_unit: Option<Unit>,
}

/// Per-material pricing aggregate derived from a full master-table scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialStats {
    pub material: String,
    /// Units seen for this material, in first-seen order, no duplicates.
    pub observed_units: Vec<Unit>,
    /// Prices in ledger order. Rows with unparsable prices never reach here.
    pub price_samples: Vec<f64>,
    pub average_price: f64,
    pub most_common_unit: Unit,
}

impl MaterialStats {
    pub fn lowest_price(&self) -> Option<f64> {
        self.price_samples.iter().copied().fold(None, |min, p| {
            Some(match min {
                Some(m) if m <= p => m,
                _ => p,
            })
        })
    }

    pub fn highest_price(&self) -> Option<f64> {
        self.price_samples.iter().copied().fold(None, |max, p| {
            Some(match max {
                Some(m) if m >= p => m,
                _ => p,
            })
        })
    }
}

/// Geographic point for a project location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Lifecycle status of a project location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
}

impl LocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationStatus::NotStarted => "Not Started",
            LocationStatus::InProgress => "In Progress",
            LocationStatus::Completed => "Completed",
        }
    }

    pub fn parse(raw: &str) -> Option<LocationStatus> {
        match raw.trim() {
            "Not Started" => Some(LocationStatus::NotStarted),
            "In Progress" => Some(LocationStatus::InProgress),
            "Completed" => Some(LocationStatus::Completed),
            _ => None,
        }
    }
}

/// Per-location progress checklist over the fixed step set.
///
/// Persisted as a JSON object of step name to flag. Unknown keys in stored
/// JSON are dropped on load; missing known steps load as `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Checklist {
    done: Vec<bool>,
}

impl Checklist {
    pub fn new() -> Self {
        Self {
            done: vec![false; CHECKLIST_STEPS.len()],
        }
    }

    /// Set one step's flag. Returns false (and changes nothing) for a step
    /// name outside the fixed set.
    pub fn set(&mut self, step: &str, done: bool) -> bool {
        match CHECKLIST_STEPS.iter().position(|s| *s == step) {
            Some(i) => {
                self.done[i] = done;
                true
            }
            None => false,
        }
    }

    pub fn is_done(&self, step: &str) -> Option<bool> {
        CHECKLIST_STEPS
            .iter()
            .position(|s| *s == step)
            .map(|i| self.done[i])
    }

    /// All steps with their flags, in the declared order.
    pub fn entries(&self) -> Vec<(&'static str, bool)> {
        CHECKLIST_STEPS
            .iter()
            .zip(self.done.iter())
            .map(|(s, d)| (*s, *d))
            .collect()
    }

    pub fn to_json(&self) -> String {
        let mut map = serde_json::Map::new();
        for (step, done) in self.entries() {
            map.insert(step.to_string(), serde_json::Value::Bool(done));
        }
        serde_json::Value::Object(map).to_string()
    }

    /// Lenient load: malformed JSON or non-boolean values read as all-false.
    pub fn from_json(raw: &str) -> Checklist {
        let parsed: serde_json::Value = serde_json::from_str(raw).unwrap_or_default();
        let mut checklist = Checklist::new();
        for (i, step) in CHECKLIST_STEPS.iter().enumerate() {
            checklist.done[i] = parsed.get(*step).and_then(|v| v.as_bool()).unwrap_or(false);
        }
        checklist
    }
}

impl Default for Checklist {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a successful bid submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    /// Opaque id for logging and audit, not stored in the ledger.
    pub id: String,
    /// Timestamp written into the `Date` column, `BID_DATE_FORMAT`.
    pub date: String,
    pub total: f64,
    /// Sanitized project table name the bid landed in.
    pub project_sheet: String,
    pub project_sheet_created: bool,
    pub project_added: bool,
    pub contractor_added: bool,
    pub material_added: bool,
}

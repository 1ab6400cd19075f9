//! Encoding and decoding between typed bid records and ledger cell strings.
//!
//! The ledger hands back rows as plain strings, formatted however the
//! workbook displays them, so money cells may arrive as "$1,234.56" and a
//! row may be shorter than the header when trailing cells are blank. Rows
//! that cannot be decoded are skipped by the batch helpers rather than
//! failing the whole read; the error names the offending column so the skip
//! log is actionable.

use crate::types::{BidRecord, MaterialEntry, Unit};

/// Title of the workbook table holding every bid.
pub const MASTER_SHEET: &str = "Master Sheet";

/// Title of the workbook table holding the materials catalog.
pub const MATERIALS_SHEET: &str = "Materials";

pub const MASTER_HEADERS: &[&str] = &[
    "Date",
    "Contractor",
    "Project Name",
    "Project Owner",
    "Location",
    "Unit Number",
    "Material",
    "Unit",
    "Quantity",
    "Price",
    "Total",
];

/// Per-project tables repeat the master columns minus the two project ones.
pub const PROJECT_HEADERS: &[&str] = &[
    "Date",
    "Contractor",
    "Location",
    "Unit Number",
    "Material",
    "Unit",
    "Quantity",
    "Price",
    "Total",
];

pub const MATERIALS_HEADERS: &[&str] = &["Material", "Unit"];

/// Workbook providers cap table titles at 31 characters.
pub const SHEET_TITLE_MAX: usize = 31;

const FORBIDDEN_TITLE_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

#[derive(Debug, thiserror::Error)]
pub enum RowDecodeError {
    #[error("row has {found} cells, expected at most {expected}")]
    TooWide { expected: usize, found: usize },
    #[error("column {column}: cannot parse {value:?} as a number")]
    Number {
        column: &'static str,
        value: String,
    },
    #[error("column {column}: unrecognized unit {value:?}")]
    Unit {
        column: &'static str,
        value: String,
    },
}

/// Parse a money cell. Dollar signs, thousands separators, and surrounding
/// whitespace are tolerated; anything else non-numeric is None.
pub fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Canonical money encoding for ledger cells: two decimals, no symbol.
pub fn format_money(value: f64) -> String {
    format!("{value:.2}")
}

/// Encode a record as a master-table row.
pub fn master_row(record: &BidRecord) -> Vec<String> {
    vec![
        record.date.clone(),
        record.contractor.clone(),
        record.project_name.clone(),
        record.project_owner.clone(),
        record.location.clone(),
        record.unit_number.clone(),
        record.material.clone(),
        record.unit.label().to_string(),
        record.quantity.to_string(),
        format_money(record.price),
        format_money(record.total),
    ]
}

/// Encode a record as a project-table row (no project name or owner columns).
pub fn project_row(record: &BidRecord) -> Vec<String> {
    vec![
        record.date.clone(),
        record.contractor.clone(),
        record.location.clone(),
        record.unit_number.clone(),
        record.material.clone(),
        record.unit.label().to_string(),
        record.quantity.to_string(),
        format_money(record.price),
        format_money(record.total),
    ]
}

fn padded(row: &[String], width: usize) -> Result<Vec<String>, RowDecodeError> {
    if row.len() > width {
        return Err(RowDecodeError::TooWide {
            expected: width,
            found: row.len(),
        });
    }
    let mut cells = row.to_vec();
    cells.resize(width, String::new());
    Ok(cells)
}

fn cell_number(column: &'static str, value: &str) -> Result<f64, RowDecodeError> {
    parse_money(value).ok_or_else(|| RowDecodeError::Number {
        column,
        value: value.to_string(),
    })
}

fn cell_unit(column: &'static str, value: &str) -> Result<Unit, RowDecodeError> {
    Unit::parse(value).ok_or_else(|| RowDecodeError::Unit {
        column,
        value: value.to_string(),
    })
}

/// Decode one master-table data row. Short rows are padded with empty cells
/// first (the provider trims trailing blanks), so the failure mode for a
/// truncated row is a typed column error, never an index panic.
pub fn decode_master_row(row: &[String]) -> Result<BidRecord, RowDecodeError> {
    let cells = padded(row, MASTER_HEADERS.len())?;
    Ok(BidRecord {
        date: cells[0].clone(),
        contractor: cells[1].clone(),
        project_name: cells[2].clone(),
        project_owner: cells[3].clone(),
        location: cells[4].clone(),
        unit_number: cells[5].clone(),
        material: cells[6].clone(),
        unit: cell_unit("Unit", &cells[7])?,
        quantity: cell_number("Quantity", &cells[8])?,
        price: cell_number("Price", &cells[9])?,
        total: cell_number("Total", &cells[10])?,
    })
}

/// Decode one project-table data row. The project name comes from the table
/// itself; project tables carry no owner column, so the owner is left empty.
pub fn decode_project_row(project: &str, row: &[String]) -> Result<BidRecord, RowDecodeError> {
    let cells = padded(row, PROJECT_HEADERS.len())?;
    Ok(BidRecord {
        date: cells[0].clone(),
        contractor: cells[1].clone(),
        project_name: project.to_string(),
        project_owner: String::new(),
        location: cells[2].clone(),
        unit_number: cells[3].clone(),
        material: cells[4].clone(),
        unit: cell_unit("Unit", &cells[5])?,
        quantity: cell_number("Quantity", &cells[6])?,
        price: cell_number("Price", &cells[7])?,
        total: cell_number("Total", &cells[8])?,
    })
}

/// Decode a full master-table read (header row included). Rows that fail to
/// decode are logged and skipped; a bad row never aborts the read.
pub fn decode_master_rows(rows: &[Vec<String>]) -> Vec<BidRecord> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, row)| match decode_master_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("skipping master row {i}: {e}");
                None
            }
        })
        .collect()
}

/// Decode a full project-table read (header row included), skipping bad rows.
pub fn decode_project_rows(project: &str, rows: &[Vec<String>]) -> Vec<BidRecord> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, row)| match decode_project_row(project, row) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("skipping row {i} of {project:?}: {e}");
                None
            }
        })
        .collect()
}

/// Decode one materials-catalog data row. Blank names are None; a blank or
/// unrecognized unit cell leaves the default unit unset.
pub fn decode_material_row(row: &[String]) -> Option<MaterialEntry> {
    let name = row.first().map(|c| c.trim()).unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(MaterialEntry {
        name: name.to_string(),
        default_unit: row.get(1).and_then(|c| Unit::parse(c)),
    })
}

/// Decode a full materials-catalog read (header row included).
pub fn decode_material_rows(rows: &[Vec<String>]) -> Vec<MaterialEntry> {
    rows.iter()
        .skip(1)
        .filter_map(|row| decode_material_row(row))
        .collect()
}

/// Derive a legal table title from a project name: forbidden characters are
/// dropped, whitespace is collapsed, and the result is cut to the provider's
/// length cap. A name with nothing usable left becomes "Project".
pub fn sheet_title(project: &str) -> String {
    let stripped: String = project
        .chars()
        .map(|c| if FORBIDDEN_TITLE_CHARS.contains(&c) { ' ' } else { c })
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(SHEET_TITLE_MAX).collect();
    let title = truncated.trim_end().to_string();
    if title.is_empty() {
        "Project".to_string()
    } else {
        title
    }
}

/// Whether a master record refers to the same bid as the given identity
/// triple. Totals compare numerically so "$90.00" and "90" agree.
pub fn same_bid(record: &BidRecord, date: &str, contractor: &str, total: f64) -> bool {
    record.date == date && record.contractor == contractor && (record.total - total).abs() < 0.005
}

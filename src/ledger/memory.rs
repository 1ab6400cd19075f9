//! In-process ledger backend.
//!
//! Backs engine tests and offline demos with plain vectors instead of the
//! remote workbook. Behavior mirrors the Sheets backend where the engine can
//! observe it: reads include the header row, deletes shift rows up, and
//! missing tables surface as `NotFound`.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::LedgerBackend;
use super::{decode, LedgerError};

struct MemorySheet {
    title: String,
    rows: Vec<Vec<String>>,
}

#[derive(Default)]
pub struct MemoryLedger {
    sheets: Mutex<Vec<MemorySheet>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty workbook seeded the way a fresh remote one is: the master
    /// and materials tables with their header rows.
    pub fn with_bootstrap() -> Self {
        let ledger = Self::new();
        ledger.add_sheet(decode::MASTER_SHEET, decode::MASTER_HEADERS);
        ledger.add_sheet(decode::MATERIALS_SHEET, decode::MATERIALS_HEADERS);
        ledger
    }

    fn add_sheet(&self, title: &str, headers: &[&str]) {
        self.sheets.lock().push(MemorySheet {
            title: title.to_string(),
            rows: vec![headers.iter().map(|h| h.to_string()).collect()],
        });
    }

    /// Snapshot of a table's rows for assertions. None for a missing table.
    pub fn rows(&self, sheet: &str) -> Option<Vec<Vec<String>>> {
        self.sheets
            .lock()
            .iter()
            .find(|s| s.title == sheet)
            .map(|s| s.rows.clone())
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedger {
    async fn sheet_titles(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.sheets.lock().iter().map(|s| s.title.clone()).collect())
    }

    async fn ensure_sheet(&self, title: &str, headers: &[&str]) -> Result<bool, LedgerError> {
        let mut sheets = self.sheets.lock();
        if sheets.iter().any(|s| s.title == title) {
            return Ok(false);
        }
        sheets.push(MemorySheet {
            title: title.to_string(),
            rows: vec![headers.iter().map(|h| h.to_string()).collect()],
        });
        Ok(true)
    }

    async fn append_row(&self, sheet: &str, row: &[String]) -> Result<(), LedgerError> {
        let mut sheets = self.sheets.lock();
        let target = sheets
            .iter_mut()
            .find(|s| s.title == sheet)
            .ok_or_else(|| LedgerError::NotFound(sheet.to_string()))?;
        target.rows.push(row.to_vec());
        Ok(())
    }

    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, LedgerError> {
        self.rows(sheet)
            .ok_or_else(|| LedgerError::NotFound(sheet.to_string()))
    }

    async fn delete_row(&self, sheet: &str, row_index: usize) -> Result<(), LedgerError> {
        let mut sheets = self.sheets.lock();
        let target = sheets
            .iter_mut()
            .find(|s| s.title == sheet)
            .ok_or_else(|| LedgerError::NotFound(sheet.to_string()))?;
        if row_index >= target.rows.len() {
            return Err(LedgerError::Api {
                status: 400,
                message: format!("row {row_index} out of range for {sheet}"),
            });
        }
        target.rows.remove(row_index);
        Ok(())
    }
}

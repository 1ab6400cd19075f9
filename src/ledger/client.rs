//! The `LedgerBackend` trait and the Sheets-backed implementation.
//!
//! `SheetsLedger` talks to the Sheets v4 values/batchUpdate endpoints and to
//! Drive v3 for workbook lookup and sharing. The workbook handle (its file
//! id) is resolved lazily on first use and cached for `HANDLE_TTL`; if the
//! workbook does not exist yet it is created and seeded with the master and
//! materials tables.

use async_trait::async_trait;
use serde::Deserialize;

use super::{decode, send_with_retry, LedgerError, RetryPolicy};
use crate::cache::{TtlCache, HANDLE_TTL};

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Storage operations the sync engine needs from a ledger.
///
/// Row indices are 0-based and absolute: row 0 is the header. `read_all`
/// returns the header row too; decoding layers skip it.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Titles of every table in the workbook, in workbook order.
    async fn sheet_titles(&self) -> Result<Vec<String>, LedgerError>;

    /// Create a table with the given header row if it does not exist.
    /// Returns true when the table was created by this call.
    async fn ensure_sheet(&self, title: &str, headers: &[&str]) -> Result<bool, LedgerError>;

    /// Append one row after the last non-empty row of a table.
    async fn append_row(&self, sheet: &str, row: &[String]) -> Result<(), LedgerError>;

    /// Every row of a table as display strings, header included.
    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, LedgerError>;

    /// Delete one row by absolute index. Rows below shift up.
    async fn delete_row(&self, sheet: &str, row_index: usize) -> Result<(), LedgerError>;

    /// Forget any cached workbook handle so the next call re-resolves it.
    fn invalidate_handle(&self) {}

    /// Delete the first data row matching `predicate`. Returns false when no
    /// row matches. The header row is never considered. Read and delete are
    /// two calls, so a concurrent writer can shift the matched index in
    /// between.
    async fn delete_row_by_match(
        &self,
        sheet: &str,
        predicate: &(dyn for<'a> Fn(&'a [String]) -> bool + Sync),
    ) -> Result<bool, LedgerError> {
        let rows = self.read_all(sheet).await?;
        for (i, row) in rows.iter().enumerate().skip(1) {
            if predicate(row) {
                self.delete_row(sheet, i).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// API response types (deserialized from Sheets / Drive JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSpreadsheetResponse {
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

// ============================================================================
// Request helpers
// ============================================================================

/// Quote a table title for an A1 range. Embedded quotes double.
fn quoted_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Range addressing the whole table (reads) or its anchor cell (appends).
fn anchor_range(sheet: &str) -> String {
    format!("{}!A1", quoted_sheet(sheet))
}

/// Drive search query matching a live spreadsheet by exact name.
fn drive_name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false")
}

// ============================================================================
// Sheets-backed ledger
// ============================================================================

pub struct SheetsLedger {
    client: reqwest::Client,
    token: String,
    workbook_name: String,
    share_email: Option<String>,
    policy: RetryPolicy,
    handle: TtlCache<String>,
}

impl SheetsLedger {
    pub fn new(
        access_token: impl Into<String>,
        workbook_name: impl Into<String>,
        share_email: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: access_token.into(),
            workbook_name: workbook_name.into(),
            share_email,
            policy: RetryPolicy::default(),
            handle: TtlCache::new(),
        }
    }

    /// Resolve the workbook's file id, consulting the handle cache first.
    /// Creates and seeds the workbook when no live file matches the name.
    pub async fn spreadsheet_id(&self) -> Result<String, LedgerError> {
        self.handle
            .get_or_try_compute("workbook", HANDLE_TTL, || self.resolve_workbook())
            .await
    }

    async fn resolve_workbook(&self) -> Result<String, LedgerError> {
        if let Some(id) = self.find_workbook().await? {
            return Ok(id);
        }

        log::info!("workbook {:?} not found, creating it", self.workbook_name);
        let id = self.create_workbook().await?;
        self.append_row_at(&id, decode::MASTER_SHEET, &to_row(decode::MASTER_HEADERS))
            .await?;
        self.append_row_at(
            &id,
            decode::MATERIALS_SHEET,
            &to_row(decode::MATERIALS_HEADERS),
        )
        .await?;

        // Sharing failures leave a private but functional workbook.
        if let Some(email) = &self.share_email {
            if let Err(e) = self.share_workbook(&id, email).await {
                log::warn!("could not share workbook with {email}: {e}");
            }
        }

        Ok(id)
    }

    async fn find_workbook(&self) -> Result<Option<String>, LedgerError> {
        let request = self
            .client
            .get(DRIVE_FILES)
            .bearer_auth(&self.token)
            .query(&[
                ("q", drive_name_query(&self.workbook_name).as_str()),
                ("fields", "files(id,name)"),
                ("pageSize", "1"),
            ]);
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp, &self.workbook_name).await);
        }
        let body: DriveFileList = resp.json().await?;
        Ok(body.files.into_iter().next().map(|f| f.id))
    }

    async fn create_workbook(&self) -> Result<String, LedgerError> {
        let body = serde_json::json!({
            "properties": { "title": self.workbook_name },
            "sheets": [
                { "properties": { "title": decode::MASTER_SHEET } },
                { "properties": { "title": decode::MATERIALS_SHEET } },
            ],
        });
        let request = self
            .client
            .post(SHEETS_BASE)
            .bearer_auth(&self.token)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp, &self.workbook_name).await);
        }
        let created: CreateSpreadsheetResponse = resp.json().await?;
        Ok(created.spreadsheet_id)
    }

    async fn share_workbook(&self, id: &str, email: &str) -> Result<(), LedgerError> {
        let body = serde_json::json!({
            "type": "user",
            "role": "writer",
            "emailAddress": email,
        });
        let request = self
            .client
            .post(format!("{DRIVE_FILES}/{id}/permissions"))
            .bearer_auth(&self.token)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp, id).await);
        }
        Ok(())
    }

    async fn sheet_properties(&self, id: &str) -> Result<Vec<SheetProperties>, LedgerError> {
        let request = self
            .client
            .get(format!("{SHEETS_BASE}/{id}"))
            .bearer_auth(&self.token)
            .query(&[("fields", "sheets.properties")]);
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp, &self.workbook_name).await);
        }
        let meta: SpreadsheetMeta = resp.json().await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties).collect())
    }

    async fn sheet_id_by_title(&self, id: &str, title: &str) -> Result<i64, LedgerError> {
        self.sheet_properties(id)
            .await?
            .into_iter()
            .find(|p| p.title == title)
            .map(|p| p.sheet_id)
            .ok_or_else(|| LedgerError::NotFound(title.to_string()))
    }

    async fn append_row_at(&self, id: &str, sheet: &str, row: &[String]) -> Result<(), LedgerError> {
        let body = serde_json::json!({ "values": [row] });
        let request = self
            .client
            .post(format!(
                "{SHEETS_BASE}/{id}/values/{}:append",
                anchor_range(sheet)
            ))
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW")])
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp, sheet).await);
        }
        Ok(())
    }

    async fn batch_update(
        &self,
        id: &str,
        requests: serde_json::Value,
        context: &str,
    ) -> Result<(), LedgerError> {
        let body = serde_json::json!({ "requests": requests });
        let request = self
            .client
            .post(format!("{SHEETS_BASE}/{id}:batchUpdate"))
            .bearer_auth(&self.token)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp, context).await);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for SheetsLedger {
    async fn sheet_titles(&self) -> Result<Vec<String>, LedgerError> {
        let id = self.spreadsheet_id().await?;
        Ok(self
            .sheet_properties(&id)
            .await?
            .into_iter()
            .map(|p| p.title)
            .collect())
    }

    async fn ensure_sheet(&self, title: &str, headers: &[&str]) -> Result<bool, LedgerError> {
        let id = self.spreadsheet_id().await?;
        let existing = self.sheet_properties(&id).await?;
        if existing.iter().any(|p| p.title == title) {
            return Ok(false);
        }

        let requests = serde_json::json!([
            { "addSheet": { "properties": { "title": title } } }
        ]);
        self.batch_update(&id, requests, title).await?;
        self.append_row_at(&id, title, &to_row(headers)).await?;
        Ok(true)
    }

    async fn append_row(&self, sheet: &str, row: &[String]) -> Result<(), LedgerError> {
        let id = self.spreadsheet_id().await?;
        self.append_row_at(&id, sheet, row).await
    }

    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, LedgerError> {
        let id = self.spreadsheet_id().await?;
        let request = self
            .client
            .get(format!(
                "{SHEETS_BASE}/{id}/values/{}",
                quoted_sheet(sheet)
            ))
            .bearer_auth(&self.token)
            .query(&[("valueRenderOption", "FORMATTED_VALUE")]);
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp, sheet).await);
        }
        let body: ValueRange = resp.json().await?;
        Ok(body.values)
    }

    async fn delete_row(&self, sheet: &str, row_index: usize) -> Result<(), LedgerError> {
        let id = self.spreadsheet_id().await?;
        let sheet_id = self.sheet_id_by_title(&id, sheet).await?;
        let requests = serde_json::json!([
            {
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row_index,
                        "endIndex": row_index + 1,
                    }
                }
            }
        ]);
        self.batch_update(&id, requests, sheet).await
    }

    fn invalidate_handle(&self) {
        self.handle.invalidate("workbook");
    }
}

fn to_row(headers: &[&str]) -> Vec<String> {
    headers.iter().map(|h| h.to_string()).collect()
}

/// Map a non-2xx response to a ledger error. `context` names what was being
/// addressed (a table title or the workbook) for NotFound messages. A range
/// over a missing table comes back from the API as a 400 parse failure, not
/// a 404, so that shape maps to NotFound too.
async fn api_error(resp: reqwest::Response, context: &str) -> LedgerError {
    let status = resp.status().as_u16();
    match status {
        401 => LedgerError::AuthExpired,
        429 => LedgerError::RateLimited,
        404 => LedgerError::NotFound(context.to_string()),
        code => {
            let message = resp.text().await.unwrap_or_default();
            if code == 400 && message.contains("Unable to parse range") {
                LedgerError::NotFound(context.to_string())
            } else {
                LedgerError::Api {
                    status: code,
                    message,
                }
            }
        }
    }
}

//! The bid submission pipeline and ledger read surface.
//!
//! A submission runs through fixed stages in order: validate, append to the
//! master table, ensure the per-project table, append to it, invalidate
//! caches, then mirror reference rows into SQLite. There is no rollback; a
//! failure stops the pipeline where it is and later stages simply never run.
//! Once the master append has succeeded, any subsequent failure means the
//! stores have diverged, which is logged and reported via the error's stage.
//! `reconcile_project` finds such divergence after the fact.

use std::collections::HashMap;

use chrono::Local;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::{TtlCache, SNAPSHOT_TTL};
use crate::db::{DbError, ReferenceDb};
use crate::error::{SubmitError, SubmitStage};
use crate::ledger::client::LedgerBackend;
use crate::ledger::decode::{self, MASTER_SHEET, MATERIALS_SHEET, PROJECT_HEADERS};
use crate::ledger::LedgerError;
use crate::stats;
use crate::types::{
    BidRecord, BidSubmission, MaterialEntry, MaterialStats, SubmitReceipt, BID_DATE_FORMAT,
};

const RECORDS_KEY: &str = "master-records";
const MATERIALS_KEY: &str = "materials-catalog";

/// Divergence between the master table and one project table.
///
/// Rows are matched by their identity triple (date, contractor, total); a
/// clean pair of tables leaves both lists empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub project: String,
    /// Master rows for this project with no matching project-table row.
    pub missing_in_project: Vec<BidRecord>,
    /// Project-table rows with no matching master row.
    pub missing_in_master: Vec<BidRecord>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.missing_in_project.is_empty() && self.missing_in_master.is_empty()
    }
}

struct MirrorOutcome {
    project_added: bool,
    contractor_added: bool,
    material_added: bool,
}

/// Coordinates the ledger, the local reference mirror, and the caches.
pub struct BidEngine<L: LedgerBackend> {
    ledger: L,
    db: ReferenceDb,
    records_cache: TtlCache<Vec<BidRecord>>,
    materials_cache: TtlCache<Vec<MaterialEntry>>,
}

impl<L: LedgerBackend> BidEngine<L> {
    pub fn new(ledger: L, db: ReferenceDb) -> Self {
        Self {
            ledger,
            db,
            records_cache: TtlCache::new(),
            materials_cache: TtlCache::new(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn references(&self) -> &ReferenceDb {
        &self.db
    }

    /// Record a bid in both stores.
    ///
    /// Stage order: Validating, AppendingMaster, EnsuringProjectTable,
    /// AppendingProject, InvalidatingCache, MirroringReferences. The total
    /// is always recomputed from quantity and price; whatever the caller
    /// thinks the total is never reaches the ledger.
    pub async fn submit_bid(
        &self,
        submission: &BidSubmission,
    ) -> Result<SubmitReceipt, SubmitError> {
        validate(submission)?;

        let id = Uuid::new_v4().to_string();
        let total = submission.quantity * submission.price;
        let date = Local::now().format(BID_DATE_FORMAT).to_string();
        let record = BidRecord {
            date: date.clone(),
            contractor: submission.contractor.clone(),
            project_name: submission.project_name.clone(),
            project_owner: submission.project_owner.clone(),
            location: submission.location.clone(),
            unit_number: submission.unit_number.clone(),
            material: submission.material.clone(),
            unit: submission.unit,
            quantity: submission.quantity,
            price: submission.price,
            total,
        };

        self.ledger
            .append_row(MASTER_SHEET, &decode::master_row(&record))
            .await
            .map_err(|e| SubmitError::ledger(SubmitStage::AppendingMaster, e))?;

        // From here on the master row exists; failures leave the stores
        // diverged and are logged as such.
        let sheet = decode::sheet_title(&submission.project_name);
        let created = match self.ledger.ensure_sheet(&sheet, PROJECT_HEADERS).await {
            Ok(created) => created,
            Err(e) => {
                log::warn!(
                    "stores diverged: master holds bid {id} but project table {sheet:?} could not be prepared"
                );
                return Err(SubmitError::ledger(SubmitStage::EnsuringProjectTable, e));
            }
        };

        if let Err(e) = self.ledger.append_row(&sheet, &decode::project_row(&record)).await {
            log::warn!(
                "stores diverged: master holds bid {id} but the append to {sheet:?} failed"
            );
            return Err(SubmitError::ledger(SubmitStage::AppendingProject, e));
        }

        self.invalidate_caches();

        let mirrored = match self.mirror_references(submission) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!(
                    "stores diverged: ledger holds bid {id} but the local mirror update failed: {e}"
                );
                return Err(SubmitError::from(e));
            }
        };

        // A material first seen here also goes into the ledger's catalog
        // table. That write is best effort: the catalog is a convenience
        // list, not part of the bid itself.
        if mirrored.material_added {
            let row = vec![
                submission.material.clone(),
                submission.unit.label().to_string(),
            ];
            match self.ledger.append_row(MATERIALS_SHEET, &row).await {
                Ok(()) => self.materials_cache.invalidate(MATERIALS_KEY),
                Err(e) => log::warn!(
                    "could not add {:?} to the materials catalog: {e}",
                    submission.material
                ),
            }
        }

        log::info!(
            "bid {id} recorded: {} by {} on {sheet:?}",
            decode::format_money(total),
            submission.contractor
        );

        Ok(SubmitReceipt {
            id,
            date,
            total,
            project_sheet: sheet,
            project_sheet_created: created,
            project_added: mirrored.project_added,
            contractor_added: mirrored.contractor_added,
            material_added: mirrored.material_added,
        })
    }

    fn mirror_references(&self, submission: &BidSubmission) -> Result<MirrorOutcome, DbError> {
        Ok(MirrorOutcome {
            project_added: self
                .db
                .add_project(&submission.project_name, &submission.project_owner)?,
            contractor_added: self
                .db
                .add_contractor(&submission.contractor, &submission.location)?,
            material_added: self.db.add_material(&submission.material, submission.unit)?,
        })
    }

    /// Decoded master-table snapshot, cached for `SNAPSHOT_TTL`.
    pub async fn master_records(&self) -> Result<Vec<BidRecord>, LedgerError> {
        self.records_cache
            .get_or_try_compute(RECORDS_KEY, SNAPSHOT_TTL, || async {
                let rows = self.ledger.read_all(MASTER_SHEET).await?;
                Ok(decode::decode_master_rows(&rows))
            })
            .await
    }

    /// Pricing stats per material over the cached master snapshot.
    pub async fn material_stats(&self) -> Result<Vec<MaterialStats>, LedgerError> {
        let records = self.master_records().await?;
        Ok(stats::compute_material_stats(&records))
    }

    /// The materials catalog, cached for `SNAPSHOT_TTL`.
    pub async fn materials(&self) -> Result<Vec<MaterialEntry>, LedgerError> {
        self.materials_cache
            .get_or_try_compute(MATERIALS_KEY, SNAPSHOT_TTL, || async {
                let rows = self.ledger.read_all(MATERIALS_SHEET).await?;
                Ok(decode::decode_material_rows(&rows))
            })
            .await
    }

    /// All decoded rows of one project table. Never cached: project views
    /// are typically consulted right after a write.
    pub async fn project_history(&self, project: &str) -> Result<Vec<BidRecord>, LedgerError> {
        let sheet = decode::sheet_title(project);
        let rows = self.ledger.read_all(&sheet).await?;
        Ok(decode::decode_project_rows(project, &rows))
    }

    /// Titles of the per-project tables, excluding the fixed ones.
    pub async fn project_sheets(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self
            .ledger
            .sheet_titles()
            .await?
            .into_iter()
            .filter(|t| t != MASTER_SHEET && t != MATERIALS_SHEET)
            .collect())
    }

    /// Per-contractor bid totals within one project.
    pub async fn contractor_totals(
        &self,
        project: &str,
    ) -> Result<HashMap<String, f64>, LedgerError> {
        let records = self.project_history(project).await?;
        Ok(stats::compute_contractor_totals(&records))
    }

    /// The cheapest contractor for a project, with their total.
    pub async fn lowest_bidder(
        &self,
        project: &str,
    ) -> Result<Option<(String, f64)>, LedgerError> {
        let totals = self.contractor_totals(project).await?;
        Ok(stats::rank_lowest_bidder(&totals))
    }

    /// Delete one bid from a project table, then its counterpart master row.
    ///
    /// `data_row_index` counts the table's data rows in ledger order, header
    /// excluded, including rows that fail to decode. Returns false when the
    /// index is past the end. The master counterpart is matched by identity
    /// triple; when none matches, the deletion still stands and the
    /// divergence is logged. A concurrent writer can shift row indices
    /// between the caller's read and this call; there is no compare-and-swap.
    pub async fn delete_bid(
        &self,
        project: &str,
        data_row_index: usize,
    ) -> Result<bool, LedgerError> {
        let sheet = decode::sheet_title(project);
        let rows = self.ledger.read_all(&sheet).await?;
        let absolute = data_row_index + 1;
        let Some(raw) = rows.get(absolute) else {
            return Ok(false);
        };
        let target = decode::decode_project_row(project, raw).ok();

        self.ledger.delete_row(&sheet, absolute).await?;

        match &target {
            Some(record) => {
                let removed = self
                    .ledger
                    .delete_row_by_match(MASTER_SHEET, &|row: &[String]| {
                        match decode::decode_master_row(row) {
                            Ok(m) => decode::same_bid(
                                &m,
                                &record.date,
                                &record.contractor,
                                record.total,
                            ),
                            Err(_) => false,
                        }
                    })
                    .await?;
                if !removed {
                    log::warn!(
                        "stores diverged: no master row matched the bid deleted from {sheet:?}"
                    );
                }
            }
            None => log::warn!(
                "row {data_row_index} of {sheet:?} did not decode; master row left in place"
            ),
        }

        self.invalidate_caches();
        Ok(true)
    }

    /// Compare the master table against one project table.
    ///
    /// Both sides are read fresh; reconciliation must not trust snapshots.
    /// Matching consumes rows, so duplicate bids only pair up one-for-one.
    pub async fn reconcile_project(&self, project: &str) -> Result<ReconcileReport, LedgerError> {
        let master_rows = self.ledger.read_all(MASTER_SHEET).await?;
        let master: Vec<BidRecord> = decode::decode_master_rows(&master_rows)
            .into_iter()
            .filter(|r| r.project_name == project)
            .collect();
        let mut unmatched_project = self.project_history(project).await?;

        let mut missing_in_project = Vec::new();
        for record in master {
            match unmatched_project
                .iter()
                .position(|p| decode::same_bid(p, &record.date, &record.contractor, record.total))
            {
                Some(i) => {
                    unmatched_project.remove(i);
                }
                None => missing_in_project.push(record),
            }
        }

        let report = ReconcileReport {
            project: project.to_string(),
            missing_in_project,
            missing_in_master: unmatched_project,
        };
        if !report.is_clean() {
            log::warn!(
                "stores diverged for {project:?}: {} master-only rows, {} project-only rows",
                report.missing_in_project.len(),
                report.missing_in_master.len()
            );
        }
        Ok(report)
    }

    /// Drop every cached snapshot and the resolved workbook handle.
    pub fn invalidate_caches(&self) {
        self.records_cache.invalidate(RECORDS_KEY);
        self.materials_cache.invalidate(MATERIALS_KEY);
        self.ledger.invalidate_handle();
    }

    /// Rebuild the per-project table for new installs against an existing
    /// workbook, creating it when the master table already mentions the
    /// project but no table exists yet.
    pub async fn ensure_project_table(&self, project: &str) -> Result<bool, LedgerError> {
        let sheet = decode::sheet_title(project);
        self.ledger.ensure_sheet(&sheet, PROJECT_HEADERS).await
    }
}

fn validate(submission: &BidSubmission) -> Result<(), SubmitError> {
    if submission.contractor.trim().is_empty() {
        return Err(SubmitError::Validation("contractor is required".to_string()));
    }
    if submission.project_name.trim().is_empty() {
        return Err(SubmitError::Validation(
            "project name is required".to_string(),
        ));
    }
    if submission.location.trim().is_empty() {
        return Err(SubmitError::Validation("location is required".to_string()));
    }
    if submission.material.trim().is_empty() {
        return Err(SubmitError::Validation("material is required".to_string()));
    }
    // Written as negations so NaN fails too
    if !(submission.quantity > 0.0) {
        return Err(SubmitError::Validation(
            "quantity must be greater than zero".to_string(),
        ));
    }
    if !(submission.price > 0.0) {
        return Err(SubmitError::Validation(
            "price must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::ledger::memory::MemoryLedger;
    use crate::types::Unit;
    use async_trait::async_trait;

    fn test_engine() -> BidEngine<MemoryLedger> {
        let _ = env_logger::builder().is_test(true).try_init();
        BidEngine::new(MemoryLedger::with_bootstrap(), test_db())
    }

    fn elm_ave_submission() -> BidSubmission {
        BidSubmission {
            contractor: "Acme Paving".to_string(),
            project_name: "Main St".to_string(),
            project_owner: "Acme Corp".to_string(),
            location: "12 Elm Ave".to_string(),
            unit_number: "4B".to_string(),
            material: "Concrete".to_string(),
            unit: Unit::Sf,
            quantity: 12.0,
            price: 7.5,
        }
    }

    #[tokio::test]
    async fn test_submit_lands_in_both_tables_and_mirror() {
        let engine = test_engine();
        let receipt = engine.submit_bid(&elm_ave_submission()).await.unwrap();

        assert!((receipt.total - 90.0).abs() < 1e-9);
        assert_eq!(receipt.project_sheet, "Main St");
        assert!(receipt.project_sheet_created);
        assert!(receipt.project_added);
        assert!(receipt.contractor_added);
        assert!(receipt.material_added);

        let master = engine.ledger().rows(MASTER_SHEET).unwrap();
        assert_eq!(master.len(), 2);
        assert_eq!(master[1][1], "Acme Paving");
        assert_eq!(master[1][9], "7.50");
        assert_eq!(master[1][10], "90.00");

        let project = engine.ledger().rows("Main St").unwrap();
        assert_eq!(project.len(), 2);
        assert_eq!(project[1].len(), PROJECT_HEADERS.len());

        assert_eq!(
            engine
                .references()
                .get_project_owner("Main St")
                .unwrap()
                .as_deref(),
            Some("Acme Corp")
        );
        assert!(engine
            .references()
            .get_contractor("Acme Paving")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_second_submission_reuses_project_table() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();

        let mut second = elm_ave_submission();
        second.contractor = "Budget Co".to_string();
        second.price = 6.0;
        let receipt = engine.submit_bid(&second).await.unwrap();

        assert!(!receipt.project_sheet_created);
        assert!(!receipt.project_added);
        assert!(!receipt.material_added);
        assert_eq!(engine.ledger().rows("Main St").unwrap().len(), 3);
        // Catalog gained Concrete exactly once
        assert_eq!(engine.ledger().rows(MATERIALS_SHEET).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_total_recomputed_from_quantity_and_price() {
        let engine = test_engine();
        let mut submission = elm_ave_submission();
        submission.quantity = 3.0;
        submission.price = 2.5;
        let receipt = engine.submit_bid(&submission).await.unwrap();
        assert!((receipt.total - 7.5).abs() < 1e-9);
        let master = engine.ledger().rows(MASTER_SHEET).unwrap();
        assert_eq!(master[1][10], "7.50");
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_write() {
        let engine = test_engine();

        let mut no_contractor = elm_ave_submission();
        no_contractor.contractor = "  ".to_string();
        let err = engine.submit_bid(&no_contractor).await.unwrap_err();
        assert_eq!(err.stage(), SubmitStage::Validating);

        let mut zero_quantity = elm_ave_submission();
        zero_quantity.quantity = 0.0;
        let err = engine.submit_bid(&zero_quantity).await.unwrap_err();
        assert!(err.user_message().contains("quantity"));

        let mut negative_price = elm_ave_submission();
        negative_price.price = -1.0;
        let err = engine.submit_bid(&negative_price).await.unwrap_err();
        assert!(err.user_message().contains("price"));

        // Nothing reached the ledger or the mirror
        assert_eq!(engine.ledger().rows(MASTER_SHEET).unwrap().len(), 1);
        assert!(engine.references().get_project("Main St").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mirror_is_first_write_wins() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();

        let mut second = elm_ave_submission();
        second.project_owner = "Different Owner".to_string();
        engine.submit_bid(&second).await.unwrap();

        assert_eq!(
            engine
                .references()
                .get_project_owner("Main St")
                .unwrap()
                .as_deref(),
            Some("Acme Corp")
        );
    }

    #[tokio::test]
    async fn test_master_snapshot_cached_until_invalidated() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();
        assert_eq!(engine.master_records().await.unwrap().len(), 1);

        // A row written behind the engine's back is not seen while cached
        let record = decode::decode_master_row(
            &engine.ledger().rows(MASTER_SHEET).unwrap()[1],
        )
        .unwrap();
        engine
            .ledger()
            .append_row(MASTER_SHEET, &decode::master_row(&record))
            .await
            .unwrap();
        assert_eq!(engine.master_records().await.unwrap().len(), 1);

        engine.invalidate_caches();
        assert_eq!(engine.master_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_invalidates_snapshot() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();
        assert_eq!(engine.master_records().await.unwrap().len(), 1);

        let mut second = elm_ave_submission();
        second.contractor = "Budget Co".to_string();
        engine.submit_bid(&second).await.unwrap();
        assert_eq!(engine.master_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_material_stats_over_master() {
        let engine = test_engine();
        let mut first = elm_ave_submission();
        first.price = 6.0;
        engine.submit_bid(&first).await.unwrap();
        let mut second = elm_ave_submission();
        second.contractor = "Budget Co".to_string();
        second.price = 8.0;
        engine.submit_bid(&second).await.unwrap();

        let stats = engine.material_stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].material, "Concrete");
        assert!((stats[0].average_price - 7.0).abs() < 1e-9);
        assert_eq!(stats[0].most_common_unit, Unit::Sf);
    }

    #[tokio::test]
    async fn test_materials_catalog_readable() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();
        let materials = engine.materials().await.unwrap();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].name, "Concrete");
        assert_eq!(materials[0].default_unit, Some(Unit::Sf));
    }

    #[tokio::test]
    async fn test_project_sheets_excludes_fixed_tables() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();
        let sheets = engine.project_sheets().await.unwrap();
        assert_eq!(sheets, vec!["Main St"]);
    }

    #[tokio::test]
    async fn test_contractor_totals_and_lowest_bidder() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap(); // 90.00
        let mut second = elm_ave_submission();
        second.contractor = "Budget Co".to_string();
        second.price = 6.0; // 72.00
        engine.submit_bid(&second).await.unwrap();

        let totals = engine.contractor_totals("Main St").await.unwrap();
        assert!((totals["Acme Paving"] - 90.0).abs() < 1e-9);
        assert!((totals["Budget Co"] - 72.0).abs() < 1e-9);

        let (name, total) = engine.lowest_bidder("Main St").await.unwrap().unwrap();
        assert_eq!(name, "Budget Co");
        assert!((total - 72.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_delete_bid_removes_both_rows() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();
        let mut second = elm_ave_submission();
        second.contractor = "Budget Co".to_string();
        engine.submit_bid(&second).await.unwrap();

        assert!(engine.delete_bid("Main St", 0).await.unwrap());

        let project = engine.ledger().rows("Main St").unwrap();
        assert_eq!(project.len(), 2);
        assert_eq!(project[1][1], "Budget Co");

        let master = engine.ledger().rows(MASTER_SHEET).unwrap();
        assert_eq!(master.len(), 2);
        assert_eq!(master[1][1], "Budget Co");
    }

    #[tokio::test]
    async fn test_delete_bid_out_of_range() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();
        assert!(!engine.delete_bid("Main St", 5).await.unwrap());
        assert_eq!(engine.ledger().rows("Main St").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_bid_without_master_match_keeps_master() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();

        // A project row the master never saw
        let orphan = vec![
            "2026-08-02 10:00:00".to_string(),
            "Ghost Co".to_string(),
            "1 Pine Rd".to_string(),
            String::new(),
            "Topsoil".to_string(),
            "SY".to_string(),
            "2".to_string(),
            "3.00".to_string(),
            "6.00".to_string(),
        ];
        engine.ledger().append_row("Main St", &orphan).await.unwrap();

        assert!(engine.delete_bid("Main St", 1).await.unwrap());
        // Master untouched: still header + the real bid
        assert_eq!(engine.ledger().rows(MASTER_SHEET).unwrap().len(), 2);
        assert_eq!(engine.ledger().rows("Main St").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_clean_after_submit() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();
        let report = engine.reconcile_project("Main St").await.unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_reconcile_reports_master_only_row() {
        let engine = test_engine();
        engine.submit_bid(&elm_ave_submission()).await.unwrap();

        let mut record = decode::decode_master_row(
            &engine.ledger().rows(MASTER_SHEET).unwrap()[1],
        )
        .unwrap();
        record.contractor = "Ghost Co".to_string();
        engine
            .ledger()
            .append_row(MASTER_SHEET, &decode::master_row(&record))
            .await
            .unwrap();

        let report = engine.reconcile_project("Main St").await.unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.missing_in_project.len(), 1);
        assert_eq!(report.missing_in_project[0].contractor, "Ghost Co");
        assert!(report.missing_in_master.is_empty());
    }

    #[tokio::test]
    async fn test_sanitized_project_name_used_for_table() {
        let engine = test_engine();
        let mut submission = elm_ave_submission();
        submission.project_name = "Main St: Phase [2]".to_string();
        let receipt = engine.submit_bid(&submission).await.unwrap();
        assert_eq!(receipt.project_sheet, "Main St Phase 2");
        assert!(engine.ledger().rows("Main St Phase 2").is_some());
        // History reads resolve through the same sanitizer
        let history = engine.project_history("Main St: Phase [2]").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    struct FailingLedger {
        inner: MemoryLedger,
        fail_append_sheet: Option<String>,
        fail_ensure: bool,
    }

    impl FailingLedger {
        fn failing_append(sheet: &str) -> Self {
            Self {
                inner: MemoryLedger::with_bootstrap(),
                fail_append_sheet: Some(sheet.to_string()),
                fail_ensure: false,
            }
        }

        fn failing_ensure() -> Self {
            Self {
                inner: MemoryLedger::with_bootstrap(),
                fail_append_sheet: None,
                fail_ensure: true,
            }
        }
    }

    #[async_trait]
    impl LedgerBackend for FailingLedger {
        async fn sheet_titles(&self) -> Result<Vec<String>, LedgerError> {
            self.inner.sheet_titles().await
        }

        async fn ensure_sheet(&self, title: &str, headers: &[&str]) -> Result<bool, LedgerError> {
            if self.fail_ensure {
                return Err(LedgerError::RateLimited);
            }
            self.inner.ensure_sheet(title, headers).await
        }

        async fn append_row(&self, sheet: &str, row: &[String]) -> Result<(), LedgerError> {
            if self.fail_append_sheet.as_deref() == Some(sheet) {
                return Err(LedgerError::RateLimited);
            }
            self.inner.append_row(sheet, row).await
        }

        async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, LedgerError> {
            self.inner.read_all(sheet).await
        }

        async fn delete_row(&self, sheet: &str, row_index: usize) -> Result<(), LedgerError> {
            self.inner.delete_row(sheet, row_index).await
        }
    }

    #[tokio::test]
    async fn test_master_append_failure_stops_everything() {
        let engine = BidEngine::new(FailingLedger::failing_append(MASTER_SHEET), test_db());
        let err = engine.submit_bid(&elm_ave_submission()).await.unwrap_err();
        assert_eq!(err.stage(), SubmitStage::AppendingMaster);
        assert!(err.is_retryable());

        // No project table, no mirror rows
        let titles = engine.ledger().inner.sheet_titles().await.unwrap();
        assert!(!titles.contains(&"Main St".to_string()));
        assert!(engine.references().get_project("Main St").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_failure_leaves_master_row() {
        let engine = BidEngine::new(FailingLedger::failing_ensure(), test_db());
        let err = engine.submit_bid(&elm_ave_submission()).await.unwrap_err();
        assert_eq!(err.stage(), SubmitStage::EnsuringProjectTable);

        // Divergence: the master append already happened
        let master = engine.ledger().inner.rows(MASTER_SHEET).unwrap();
        assert_eq!(master.len(), 2);
        assert!(engine.references().get_project("Main St").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_project_append_failure_leaves_master_row() {
        let engine = BidEngine::new(FailingLedger::failing_append("Main St"), test_db());
        let err = engine.submit_bid(&elm_ave_submission()).await.unwrap_err();
        assert_eq!(err.stage(), SubmitStage::AppendingProject);
        assert!(err.is_retryable());

        let master = engine.ledger().inner.rows(MASTER_SHEET).unwrap();
        assert_eq!(master.len(), 2);
        // The project table exists but holds only its header
        assert_eq!(engine.ledger().inner.rows("Main St").unwrap().len(), 1);
        // Mirroring never ran
        assert!(engine.references().get_contractor("Acme Paving").unwrap().is_none());
    }
}

//! Error types for the bid submission pipeline.
//!
//! Errors are classified by recoverability:
//! - Retryable: rate limits, transient network failures
//! - NonRetryable: validation failures, missing tables, local store errors
//!
//! Every failure names the pipeline stage it happened in so the surface can
//! tell the user exactly what did and did not happen.

use thiserror::Error;

use crate::db::DbError;
use crate::ledger::LedgerError;

/// Stages of the bid submission pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmitStage {
    Validating,
    AppendingMaster,
    EnsuringProjectTable,
    AppendingProject,
    InvalidatingCache,
    MirroringReferences,
}

impl SubmitStage {
    /// Short human-readable phrase for user-facing messages.
    pub fn describe(&self) -> &'static str {
        match self {
            SubmitStage::Validating => "validating the submission",
            SubmitStage::AppendingMaster => "writing to the master sheet",
            SubmitStage::EnsuringProjectTable => "preparing the project sheet",
            SubmitStage::AppendingProject => "writing to the project sheet",
            SubmitStage::InvalidatingCache => "refreshing cached data",
            SubmitStage::MirroringReferences => "updating local reference data",
        }
    }
}

/// Error from the bid submission pipeline.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed while {}: {source}", .stage.describe())]
    Ledger {
        stage: SubmitStage,
        #[source]
        source: LedgerError,
    },

    #[error("Failed while {}: {source}", SubmitStage::MirroringReferences.describe())]
    Db {
        #[from]
        source: DbError,
    },
}

impl SubmitError {
    pub fn ledger(stage: SubmitStage, source: LedgerError) -> Self {
        SubmitError::Ledger { stage, source }
    }

    /// The pipeline stage this failure occurred in.
    pub fn stage(&self) -> SubmitStage {
        match self {
            SubmitError::Validation(_) => SubmitStage::Validating,
            SubmitError::Ledger { stage, .. } => *stage,
            SubmitError::Db { .. } => SubmitStage::MirroringReferences,
        }
    }

    /// True when retrying the same submission may succeed without changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Ledger { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Message suitable for direct display. Rate-limit failures suggest a
    /// pause before retrying.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Validation(msg) => format!("Please fix the submission: {}", msg),
            SubmitError::Ledger { stage, source } if source.is_rate_limited() => format!(
                "The ledger is rate limited; failed while {}. Wait a moment and try again.",
                stage.describe()
            ),
            SubmitError::Ledger { stage, source } if source.is_retryable() => format!(
                "A temporary error occurred while {}. Try again shortly.",
                stage.describe()
            ),
            SubmitError::Ledger { stage, source } => {
                format!("Failed while {}: {}", stage.describe(), source)
            }
            SubmitError::Db { source } => format!(
                "Failed while {}: {}",
                SubmitStage::MirroringReferences.describe(),
                source
            ),
        }
    }
}

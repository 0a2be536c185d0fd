//! Per-target results of bulk mutations.
//!
//! A bulk operation never turns one target's failure into an error for the
//! whole batch. Each target gets a [`MutationOutcome`], and the batch as a
//! whole is summarized in a [`BulkSummary`].

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, ErrorKind};

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationOutcome {
    Succeeded,
    Skipped { reason: String },
    Failed { kind: ErrorKind, message: String },
}

impl MutationOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome for one song of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub id: i64,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: MutationOutcome,
}

/// Overall status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    /// No target failed
    Complete,
    /// Some targets failed, some succeeded
    PartialFailure,
    /// Targets failed and none succeeded
    Failed,
    /// There were no targets
    Empty,
}

/// Ordered outcomes of a batch plus counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub status: BulkStatus,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<TargetOutcome>,
}

impl BulkSummary {
    /// Summarize outcomes, keeping their order.
    pub fn from_outcomes(outcomes: Vec<TargetOutcome>) -> Self {
        let mut succeeded = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for target in &outcomes {
            match target.outcome {
                MutationOutcome::Succeeded => succeeded += 1,
                MutationOutcome::Skipped { .. } => skipped += 1,
                MutationOutcome::Failed { .. } => failed += 1,
            }
        }

        let status = if outcomes.is_empty() {
            BulkStatus::Empty
        } else if failed == 0 {
            BulkStatus::Complete
        } else if succeeded == 0 {
            BulkStatus::Failed
        } else {
            BulkStatus::PartialFailure
        };

        Self {
            status,
            succeeded,
            skipped,
            failed,
            outcomes,
        }
    }
}

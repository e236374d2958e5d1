//! End-of-batch report

use super::DispatchOutcome;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-row dispatch record kept for the summary
#[derive(Debug, Clone)]
pub struct RowReport {
    pub proprietary_id: String,
    pub user_record_id: String,
    pub outcome: DispatchOutcome,
}

/// Counts and outcomes for one run
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_loaded: usize,
    pub rows_resolved: usize,
    pub dry_run: bool,
    pub reports: Vec<RowReport>,
}

impl BatchSummary {
    pub fn rows_unresolved(&self) -> usize {
        self.rows_loaded - self.rows_resolved
    }

    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }
}

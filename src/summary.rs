use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Normalizing,
    Reconciling,
    Grouping,
    Done,
    Failed,
}

impl SyncState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncState::Done | SyncState::Failed)
    }
}

/// Counters for one run. Always produced, whatever the final state.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub state: SyncState,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub cancelled: bool,

    pub queries_total: usize,
    pub queries_failed: usize,
    pub queries_skipped: usize,

    pub items_fetched: usize,
    pub items_filtered: usize,
    pub normalized: usize,
    pub normalize_failed: usize,

    pub reconciled_created: usize,
    pub reconciled_updated: usize,
    pub reconcile_failed: usize,
    pub reconcile_skipped: usize,

    pub bundles_created: usize,
    pub bundles_failed: usize,
    pub bundles_skipped: usize,

    /// Codes whose upsert failed, with the reason.
    pub failed_codes: Vec<(String, String)>,
    pub snapshot_files: Vec<PathBuf>,
    /// Set when the run could not start or fetched nothing at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: SyncState::Idle,
            started_at,
            elapsed_ms: 0,
            cancelled: false,
            queries_total: 0,
            queries_failed: 0,
            queries_skipped: 0,
            items_fetched: 0,
            items_filtered: 0,
            normalized: 0,
            normalize_failed: 0,
            reconciled_created: 0,
            reconciled_updated: 0,
            reconcile_failed: 0,
            reconcile_skipped: 0,
            bundles_created: 0,
            bundles_failed: 0,
            bundles_skipped: 0,
            failed_codes: Vec::new(),
            snapshot_files: Vec::new(),
            fatal_error: None,
        }
    }

    pub fn reconciled_ok(&self) -> usize {
        self.reconciled_created + self.reconciled_updated
    }

    pub fn finish(&mut self, state: SyncState, elapsed: Duration) {
        self.state = state;
        self.elapsed_ms = elapsed.as_millis() as u64;
    }

    /// Exit criterion of the CLI: finished and at least one price reconciled.
    pub fn is_success(&self) -> bool {
        self.state == SyncState::Done && self.reconciled_ok() > 0
    }

    pub fn log(&self) {
        info!(
            state = ?self.state,
            started_at = %self.started_at.to_rfc3339(),
            elapsed_ms = self.elapsed_ms,
            cancelled = self.cancelled,
            queries = self.queries_total,
            queries_failed = self.queries_failed,
            queries_skipped = self.queries_skipped,
            fetched = self.items_fetched,
            filtered = self.items_filtered,
            normalized = self.normalized,
            normalize_failed = self.normalize_failed,
            created = self.reconciled_created,
            updated = self.reconciled_updated,
            reconcile_failed = self.reconcile_failed,
            reconcile_skipped = self.reconcile_skipped,
            bundles_created = self.bundles_created,
            bundles_failed = self.bundles_failed,
            bundles_skipped = self.bundles_skipped,
            "sync summary"
        );
        for path in &self.snapshot_files {
            info!(file = %path.display(), "snapshot written");
        }
        if let Some(err) = &self.fatal_error {
            info!(error = %err, "run failed");
        }
    }
}

//! Idempotent upsert of normalized prices, keyed by their code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::destination::CatalogDestination;
use crate::error::ReconcileError;
use crate::model::{PricingRecord, ReconcileOutcome, ReconciledRecord};
use crate::retry::RetryPolicy;

/// One async lock per price code, so lookup-then-write is never interleaved
/// for the same code.
#[derive(Debug, Default)]
struct CodeLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CodeLocks {
    async fn acquire(&self, code: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(code.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Clone)]
pub struct ReconciliationClient {
    destination: Arc<dyn CatalogDestination>,
    retry: RetryPolicy,
    locks: Arc<CodeLocks>,
}

impl ReconciliationClient {
    pub fn new(destination: Arc<dyn CatalogDestination>, retry: RetryPolicy) -> Self {
        Self {
            destination,
            retry,
            locks: Arc::new(CodeLocks::default()),
        }
    }

    /// Updates the price with the same code in place, or creates it. Lookup
    /// and write are retried independently.
    pub async fn upsert(&self, record: &PricingRecord) -> Result<ReconciledRecord, ReconcileError> {
        let code = record.code.as_str();
        let _guard = self.locks.acquire(code).await;

        let existing = self
            .retry
            .run("find_price", |_| self.destination.find_price(code))
            .await?;

        let (id, outcome) = match existing {
            Some(id) => {
                self.retry
                    .run("update_price", |_| self.destination.update_price(id, record))
                    .await?;
                (id, ReconcileOutcome::Updated)
            }
            None => {
                let id = self
                    .retry
                    .run("create_price", |_| self.destination.create_price(record))
                    .await?;
                (id, ReconcileOutcome::Created)
            }
        };
        debug!(code, id, outcome = ?outcome, "price reconciled");

        Ok(ReconciledRecord {
            record: record.clone(),
            destination_id: Some(id),
            outcome,
            error: None,
        })
    }

    /// Never fails: errors become a `failed` record carrying the reason.
    pub async fn reconcile(&self, record: PricingRecord) -> ReconciledRecord {
        match self.upsert(&record).await {
            Ok(done) => done,
            Err(err) => {
                warn!(code = %record.code, class = %err.class, error = %err.reason, "price reconciliation failed");
                ReconciledRecord {
                    record,
                    destination_id: None,
                    outcome: ReconcileOutcome::Failed,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

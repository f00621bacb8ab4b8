use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use indexmap::IndexMap;

use super::CatalogDestination;
use crate::error::{BundleError, ReconcileError};
use crate::model::{Bundle, DestinationId, PricingRecord};

/// First synthetic id handed out by an offline run.
pub const FIRST_SYNTHETIC_ID: DestinationId = 1000;

#[derive(Debug, Default)]
struct OfflineState {
    next_id: DestinationId,
    prices: IndexMap<String, (DestinationId, PricingRecord)>,
    bundles: Vec<Bundle>,
}

/// In-memory catalog used by download runs: assigns synthetic ids and keeps
/// everything for the snapshot files. No network involved.
#[derive(Debug)]
pub struct OfflineCatalog {
    state: Mutex<OfflineState>,
}

impl Default for OfflineCatalog {
    fn default() -> Self {
        Self::starting_at(FIRST_SYNTHETIC_ID)
    }
}

impl OfflineCatalog {
    pub fn starting_at(first_id: DestinationId) -> Self {
        Self {
            state: Mutex::new(OfflineState {
                next_id: first_id,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn price_count(&self) -> usize {
        self.state().prices.len()
    }

    /// Stored prices in creation order.
    pub fn prices(&self) -> Vec<(DestinationId, PricingRecord)> {
        self.state().prices.values().cloned().collect()
    }

    pub fn bundles(&self) -> Vec<Bundle> {
        self.state().bundles.clone()
    }
}

#[async_trait]
impl CatalogDestination for OfflineCatalog {
    async fn find_price(&self, code: &str) -> Result<Option<DestinationId>, ReconcileError> {
        Ok(self.state().prices.get(code).map(|(id, _)| *id))
    }

    async fn create_price(&self, record: &PricingRecord) -> Result<DestinationId, ReconcileError> {
        let mut state = self.state();
        if state.prices.contains_key(&record.code) {
            return Err(ReconcileError::permanent(
                &record.code,
                "code already exists",
            ));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.prices.insert(record.code.clone(), (id, record.clone()));
        Ok(id)
    }

    async fn update_price(
        &self,
        id: DestinationId,
        record: &PricingRecord,
    ) -> Result<(), ReconcileError> {
        let mut state = self.state();
        match state.prices.get_mut(&record.code) {
            Some(entry) if entry.0 == id => {
                entry.1 = record.clone();
                Ok(())
            }
            _ => Err(ReconcileError::permanent(
                &record.code,
                format!("no price with id {id}"),
            )),
        }
    }

    async fn create_bundle(&self, bundle: &Bundle) -> Result<Option<DestinationId>, BundleError> {
        let mut state = self.state();
        if state.bundles.iter().any(|b| b.code == bundle.code) {
            return Err(BundleError::permanent(&bundle.code, "bundle code already exists"));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.bundles.push(bundle.clone());
        Ok(Some(id))
    }
}

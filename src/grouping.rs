//! Partitioning of reconciled prices into bundles and their submission.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{info, warn};

use crate::destination::CatalogDestination;
use crate::model::{
    Bundle, BundleKind, DestinationId, GroupKey, PriceKind, Provider, ReconciledRecord,
};
use crate::retry::RetryPolicy;

const STORAGE_MARKERS: [&str; 3] = ["storage", "disk", "blob"];
const COMPUTE_MARKERS: [&str; 2] = ["virtual", "compute"];

/// Storage markers win over compute markers; anything else is plain compute.
pub fn bundle_kind_for(family: &str) -> BundleKind {
    let lower = family.to_lowercase();
    if STORAGE_MARKERS.iter().any(|k| lower.contains(k)) {
        BundleKind::Storage
    } else if COMPUTE_MARKERS.iter().any(|k| lower.contains(k)) {
        BundleKind::ComputePlusStorage
    } else {
        BundleKind::Compute
    }
}

/// AWS bundles are per instance type and carry the instance's disk; a group
/// made only of storage prices is a storage bundle.
fn bundle_kind_of(key: &GroupKey, storage_only: bool) -> BundleKind {
    match key.provider {
        Provider::Aws if storage_only => BundleKind::Storage,
        Provider::Aws => BundleKind::ComputePlusStorage,
        _ => bundle_kind_for(&key.family),
    }
}

/// Lowercase with all whitespace removed, for code segments.
fn compact(text: &str) -> String {
    text.split_whitespace().collect::<String>().to_lowercase()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleResult {
    pub bundle: Bundle,
    pub destination_id: Option<DestinationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BundleResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Member ids of one partition and whether every member is a storage price.
struct Partition {
    ids: IndexSet<DestinationId>,
    storage_only: bool,
}

impl Default for Partition {
    fn default() -> Self {
        Self {
            ids: IndexSet::new(),
            storage_only: true,
        }
    }
}

#[derive(Clone)]
pub struct BundleGrouper {
    prefix: String,
    destination: Arc<dyn CatalogDestination>,
    retry: RetryPolicy,
}

impl BundleGrouper {
    pub fn new(
        prefix: impl Into<String>,
        destination: Arc<dyn CatalogDestination>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            destination,
            retry,
        }
    }

    /// Bundles for every group key with at least one successful member, in
    /// first-seen order. Members keep the order of `records`; a destination id
    /// is listed once per bundle.
    pub fn group(&self, records: &[ReconciledRecord]) -> Vec<Bundle> {
        let mut partitions: IndexMap<&GroupKey, Partition> = IndexMap::new();
        for rec in records.iter().filter(|r| r.succeeded()) {
            if let Some(id) = rec.destination_id {
                let part = partitions.entry(&rec.record.group_key).or_default();
                part.ids.insert(id);
                part.storage_only &= rec.record.price_kind == PriceKind::Storage;
            }
        }
        partitions
            .into_iter()
            .filter(|(_, part)| !part.ids.is_empty())
            .map(|(key, part)| {
                let kind = bundle_kind_of(key, part.storage_only);
                self.bundle_for(key, part.ids.into_iter().collect(), kind)
            })
            .collect()
    }

    fn bundle_for(
        &self,
        key: &GroupKey,
        member_ids: Vec<DestinationId>,
        kind: BundleKind,
    ) -> Bundle {
        let region_code = compact(&key.region);
        // GCP machine-type bundles live under `<prefix>.google.compute.`
        let provider_segment = match key.provider {
            Provider::Gcp => format!("{}.compute", key.provider.code_slug()),
            _ => key.provider.code_slug().to_string(),
        };
        Bundle {
            name: format!(
                "{} - {} - {} - {}",
                self.prefix,
                key.provider.label(),
                key.family,
                key.region
            ),
            code: format!(
                "{}.{}.{}.{}",
                self.prefix.trim().to_lowercase(),
                provider_segment,
                compact(&key.family),
                region_code
            ),
            member_ids,
            bundle_kind: kind,
            region_code,
            group_key: key.clone(),
        }
    }

    /// One creation call (with retries) for a single bundle.
    pub async fn submit(&self, bundle: Bundle) -> BundleResult {
        let outcome = self
            .retry
            .run("create_bundle", |_| self.destination.create_bundle(&bundle))
            .await;
        match outcome {
            Ok(destination_id) => {
                info!(
                    code = %bundle.code,
                    members = bundle.member_ids.len(),
                    kind = bundle.bundle_kind.as_str(),
                    "bundle created"
                );
                BundleResult {
                    bundle,
                    destination_id,
                    error: None,
                }
            }
            Err(err) => {
                warn!(code = %bundle.code, class = %err.class, error = %err.reason, "bundle creation failed");
                BundleResult {
                    bundle,
                    destination_id: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Submits bundles one after another; a failure never affects the others.
    pub async fn submit_all(&self, bundles: Vec<Bundle>) -> Vec<BundleResult> {
        let mut results = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            results.push(self.submit(bundle).await);
        }
        results
    }
}

//! End-to-end driver: fetch, normalize, reconcile, group.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Utc};
use futures::{stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::destination::CatalogDestination;
use crate::error::{ConfigError, FetchError};
use crate::fetch::SourceQuery;
use crate::grouping::BundleGrouper;
use crate::model::{PricingRecord, Provider, RawCatalogItem, ReconcileOutcome, ReconciledRecord};
use crate::normalization::NormalizeContext;
use crate::providers::{build_sources, ProviderSource};
use crate::reconcile::ReconciliationClient;
use crate::retry::RetryPolicy;
use crate::snapshot::SnapshotWriter;
use crate::summary::{RunSummary, SyncState};

const PROGRESS_EVERY: usize = 100;

/// Raises the cancellation signal of one run.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Observes the cancellation signal. Once raised no new fetch, upsert or
/// bundle call is issued; calls already in flight run to completion.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelToken(rx))
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub prefix: String,
    pub currency: String,
    pub fetch_concurrency: usize,
    pub reconcile_concurrency: usize,
}

impl OrchestratorOptions {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            prefix: cfg.prefix.clone(),
            currency: cfg.currency.clone(),
            fetch_concurrency: cfg.fetch_concurrency.max(1),
            reconcile_concurrency: cfg.reconcile_concurrency.max(1),
        }
    }
}

enum FetchOutcome {
    Fetched(Vec<RawCatalogItem>),
    Failed(FetchError),
    Skipped,
}

enum ReconcileStep {
    Done(ReconciledRecord),
    Skipped,
}

/// Items of one fetched query, waiting to be normalized.
struct FetchedQuery<'a> {
    source: &'a ProviderSource,
    query: SourceQuery,
    items: Vec<RawCatalogItem>,
}

/// Holds wiring only; every run gets its own lock map and cancel token.
pub struct SyncOrchestrator {
    sources: Vec<ProviderSource>,
    destination: Arc<dyn CatalogDestination>,
    retry: RetryPolicy,
    grouper: BundleGrouper,
    options: OrchestratorOptions,
    snapshots: Option<SnapshotWriter>,
}

impl SyncOrchestrator {
    pub fn new(
        sources: Vec<ProviderSource>,
        destination: Arc<dyn CatalogDestination>,
        retry: RetryPolicy,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            sources,
            grouper: BundleGrouper::new(options.prefix.clone(), destination.clone(), retry.clone()),
            destination,
            retry,
            options,
            snapshots: None,
        }
    }

    /// Validates the configuration and wires every enabled provider.
    pub fn from_config(
        cfg: &SyncConfig,
        destination: Arc<dyn CatalogDestination>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let sources = build_sources(cfg)?;
        let mut orchestrator = Self::new(
            sources,
            destination,
            cfg.retry.clone(),
            OrchestratorOptions::from_config(cfg),
        );
        if let Some(dir) = &cfg.output_dir {
            orchestrator = orchestrator.with_snapshots(SnapshotWriter::new(dir, Local::now()));
        }
        Ok(orchestrator)
    }

    pub fn with_snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    fn enter(&self, summary: &mut RunSummary, state: SyncState) {
        info!(from = ?summary.state, to = ?state, "sync state");
        summary.state = state;
    }

    /// One run that cannot be cancelled from outside.
    pub async fn run(&self) -> RunSummary {
        let (_handle, cancel) = cancellation();
        self.run_with_cancel(cancel).await
    }

    pub async fn run_with_cancel(&self, cancel: CancelToken) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(Utc::now());

        self.enter(&mut summary, SyncState::Fetching);
        let fetched = self.fetch_all(&cancel, &mut summary).await;
        if summary.queries_total > 0 && fetched.is_empty() {
            let reason = format!(
                "no source query could be fetched ({} failed, {} skipped)",
                summary.queries_failed, summary.queries_skipped
            );
            error!(reason = %reason, "sync failed");
            summary.fatal_error = Some(reason);
            summary.cancelled = cancel.is_cancelled();
            summary.finish(SyncState::Failed, started.elapsed());
            summary.log();
            return summary;
        }

        self.enter(&mut summary, SyncState::Normalizing);
        let records = self.normalize_all(&fetched, &mut summary);
        self.snapshot_raw(&fetched, &mut summary);
        drop(fetched);

        self.enter(&mut summary, SyncState::Reconciling);
        let reconciled = self.reconcile_all(records, &cancel, &mut summary).await;

        self.enter(&mut summary, SyncState::Grouping);
        self.group_all(&reconciled, &cancel, &mut summary).await;

        summary.cancelled = cancel.is_cancelled();
        summary.finish(SyncState::Done, started.elapsed());
        summary.log();
        summary
    }

    async fn fetch_all(
        &self,
        cancel: &CancelToken,
        summary: &mut RunSummary,
    ) -> Vec<FetchedQuery<'_>> {
        let jobs: Vec<(&ProviderSource, SourceQuery)> = self
            .sources
            .iter()
            .flat_map(|source| source.queries.iter().map(move |q| (source, q.clone())))
            .collect();
        summary.queries_total = jobs.len();

        let outcomes: Vec<(&ProviderSource, SourceQuery, FetchOutcome)> = stream::iter(jobs)
            .map(|(source, query)| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (source, query, FetchOutcome::Skipped);
                    }
                    let outcome = match source.fetcher.fetch(&query).await {
                        Ok(items) => FetchOutcome::Fetched(items),
                        Err(err) => FetchOutcome::Failed(err),
                    };
                    (source, query, outcome)
                }
            })
            .buffered(self.options.fetch_concurrency)
            .collect()
            .await;

        let mut fetched = Vec::new();
        for (source, query, outcome) in outcomes {
            match outcome {
                FetchOutcome::Fetched(items) => {
                    info!(query = %query.label(), items = items.len(), "query fetched");
                    summary.items_fetched += items.len();
                    fetched.push(FetchedQuery {
                        source,
                        query,
                        items,
                    });
                }
                FetchOutcome::Failed(err) => {
                    warn!(query = %query.label(), class = %err.class, error = %err.reason, "query failed");
                    summary.queries_failed += 1;
                }
                FetchOutcome::Skipped => summary.queries_skipped += 1,
            }
        }
        fetched
    }

    fn normalize_all(
        &self,
        fetched: &[FetchedQuery<'_>],
        summary: &mut RunSummary,
    ) -> Vec<PricingRecord> {
        let mut records = Vec::new();
        for batch in fetched {
            let ctx = NormalizeContext {
                prefix: &self.options.prefix,
                currency: &self.options.currency,
                service: &batch.query.service,
                region: &batch.query.region,
            };
            let normalizer = &batch.source.normalizer;
            for item in &batch.items {
                if !normalizer.accepts(item, &ctx) {
                    summary.items_filtered += 1;
                    continue;
                }
                match normalizer.normalize(item, &ctx) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        debug!(query = %batch.query.label(), error = %err, "item skipped");
                        summary.normalize_failed += 1;
                    }
                }
            }
        }
        summary.normalized = records.len();
        info!(
            normalized = summary.normalized,
            filtered = summary.items_filtered,
            failed = summary.normalize_failed,
            "normalization complete"
        );
        records
    }

    async fn reconcile_all(
        &self,
        records: Vec<PricingRecord>,
        cancel: &CancelToken,
        summary: &mut RunSummary,
    ) -> Vec<ReconciledRecord> {
        let total = records.len();
        let reconciler = ReconciliationClient::new(self.destination.clone(), self.retry.clone());
        let mut steps = stream::iter(records)
            .map(|record| {
                let client = reconciler.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        ReconcileStep::Skipped
                    } else {
                        ReconcileStep::Done(client.reconcile(record).await)
                    }
                }
            })
            .buffered(self.options.reconcile_concurrency);

        let mut reconciled = Vec::with_capacity(total);
        let mut processed = 0usize;
        while let Some(step) = steps.next().await {
            processed += 1;
            match step {
                ReconcileStep::Done(rec) => {
                    match rec.outcome {
                        ReconcileOutcome::Created => summary.reconciled_created += 1,
                        ReconcileOutcome::Updated => summary.reconciled_updated += 1,
                        ReconcileOutcome::Failed => {
                            summary.reconcile_failed += 1;
                            summary.failed_codes.push((
                                rec.record.code.clone(),
                                rec.error.clone().unwrap_or_default(),
                            ));
                        }
                    }
                    reconciled.push(rec);
                }
                ReconcileStep::Skipped => summary.reconcile_skipped += 1,
            }
            if processed % PROGRESS_EVERY == 0 {
                info!(processed, total, "reconciliation progress");
            }
        }
        info!(
            created = summary.reconciled_created,
            updated = summary.reconciled_updated,
            failed = summary.reconcile_failed,
            skipped = summary.reconcile_skipped,
            "reconciliation complete"
        );
        reconciled
    }

    async fn group_all(
        &self,
        reconciled: &[ReconciledRecord],
        cancel: &CancelToken,
        summary: &mut RunSummary,
    ) {
        let bundles = self.grouper.group(reconciled);
        let mut created = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            if cancel.is_cancelled() {
                summary.bundles_skipped += 1;
                continue;
            }
            let result = self.grouper.submit(bundle).await;
            if result.succeeded() {
                summary.bundles_created += 1;
            } else {
                summary.bundles_failed += 1;
            }
            created.push(result);
        }

        if let Some(writer) = &self.snapshots {
            for provider in self.providers() {
                let prices: Vec<ReconciledRecord> = reconciled
                    .iter()
                    .filter(|r| r.record.provider == provider)
                    .cloned()
                    .collect();
                let bundles: Vec<_> = created
                    .iter()
                    .filter(|b| b.succeeded() && b.bundle.group_key.provider == provider)
                    .map(|b| b.bundle.clone())
                    .collect();
                let written = writer
                    .write_prices(provider, &prices, &self.options.prefix)
                    .and_then(|prices_path| {
                        let bundles_path = writer.write_bundles(provider, &bundles)?;
                        Ok((prices_path, bundles_path))
                    });
                match written {
                    Ok((prices_path, bundles_path)) => {
                        summary.snapshot_files.push(prices_path);
                        summary.snapshot_files.push(bundles_path);
                    }
                    Err(err) => warn!(provider = %provider, error = %format!("{err:#}"), "snapshot write failed"),
                }
            }
        }
    }

    fn snapshot_raw(&self, fetched: &[FetchedQuery<'_>], summary: &mut RunSummary) {
        let Some(writer) = &self.snapshots else {
            return;
        };
        for provider in self.providers() {
            let raw: Vec<RawCatalogItem> = fetched
                .iter()
                .filter(|f| f.source.provider == provider)
                .flat_map(|f| f.items.iter().cloned())
                .collect();
            match writer.write_raw(provider, &raw) {
                Ok(path) => summary.snapshot_files.push(path),
                Err(err) => warn!(provider = %provider, error = %format!("{err:#}"), "snapshot write failed"),
            }
        }
    }

    fn providers(&self) -> Vec<Provider> {
        let mut out: Vec<Provider> = Vec::new();
        for source in &self.sources {
            if !out.contains(&source.provider) {
                out.push(source.provider);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::OfflineCatalog;
    use crate::fetch::{Page, PageSource, PaginatedFetcher};
    use crate::providers::azure::AzureNormalizer;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Azure-shaped items keyed by region; `fail` regions error permanently.
    struct CannedAzure {
        fail: Vec<&'static str>,
    }

    #[async_trait]
    impl PageSource for CannedAzure {
        fn endpoint(&self) -> &str {
            "canned"
        }

        async fn fetch_page(
            &self,
            query: &SourceQuery,
            _cursor: Option<&str>,
        ) -> Result<Page, FetchError> {
            if self.fail.contains(&query.region.as_str()) {
                return Err(FetchError::permanent("canned", "http 403"));
            }
            let items = vec![
                json!({"meterId": "vm1", "serviceName": "Virtual Machines", "productName": "Virtual Machines D Series",
                       "meterName": "D2 v3", "armRegionName": query.region, "retailPrice": 0.1, "unitOfMeasure": "1 Hour"}),
                json!({"meterId": "disk1", "serviceName": "Storage", "productName": "Premium SSD Managed Disks",
                       "meterName": "P10 Disks", "armRegionName": query.region, "retailPrice": 19.7, "unitOfMeasure": "1/Month"}),
                json!({"serviceName": "Storage", "retailPrice": 1}),
            ];
            Ok(Page {
                items: items.into_iter().map(RawCatalogItem::new).collect(),
                next_cursor: None,
            })
        }
    }

    fn orchestrator(
        regions: &[&str],
        fail: Vec<&'static str>,
        catalog: Arc<OfflineCatalog>,
    ) -> SyncOrchestrator {
        let retry = RetryPolicy::new(2, Duration::from_millis(1));
        let source = ProviderSource {
            provider: Provider::Azure,
            queries: regions
                .iter()
                .map(|r| SourceQuery::new(Provider::Azure, "Virtual Machines", *r, vec![]))
                .collect(),
            fetcher: PaginatedFetcher::new(
                Arc::new(CannedAzure { fail }),
                retry.clone(),
                5,
                Duration::ZERO,
            ),
            normalizer: Arc::new(AzureNormalizer::default()),
        };
        SyncOrchestrator::new(
            vec![source],
            catalog,
            retry,
            OrchestratorOptions {
                prefix: "acme".into(),
                currency: "USD".into(),
                fetch_concurrency: 2,
                reconcile_concurrency: 4,
            },
        )
    }

    #[tokio::test]
    async fn full_run_counts_every_stage() {
        let catalog = Arc::new(OfflineCatalog::default());
        let summary = orchestrator(&["eastus", "westus2"], vec![], catalog.clone()).run().await;

        assert_eq!(summary.state, SyncState::Done);
        assert_eq!(summary.items_fetched, 6);
        assert_eq!(summary.normalized, 4);
        assert_eq!(summary.normalize_failed, 2);
        assert_eq!(summary.reconciled_created, 4);
        // two product families in two regions
        assert_eq!(summary.bundles_created, 4);
        assert!(summary.is_success());
        assert_eq!(catalog.price_count(), 4);
    }

    #[tokio::test]
    async fn rerun_updates_instead_of_creating() {
        let catalog = Arc::new(OfflineCatalog::default());
        let orch = orchestrator(&["eastus"], vec![], catalog.clone());
        orch.run().await;
        let second = orchestrator(&["eastus"], vec![], catalog.clone()).run().await;
        assert_eq!(second.reconciled_created, 0);
        assert_eq!(second.reconciled_updated, 2);
        assert_eq!(catalog.price_count(), 2);
    }

    #[tokio::test]
    async fn partial_fetch_failure_still_completes() {
        let catalog = Arc::new(OfflineCatalog::default());
        let summary = orchestrator(&["eastus", "westus2"], vec!["westus2"], catalog).run().await;
        assert_eq!(summary.state, SyncState::Done);
        assert_eq!(summary.queries_failed, 1);
        assert_eq!(summary.reconciled_created, 2);
    }

    #[tokio::test]
    async fn total_fetch_failure_fails_the_run() {
        let catalog = Arc::new(OfflineCatalog::default());
        let summary = orchestrator(&["eastus"], vec!["eastus"], catalog.clone()).run().await;
        assert_eq!(summary.state, SyncState::Failed);
        assert!(summary.fatal_error.is_some());
        assert_eq!(catalog.price_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_run_issues_no_calls() {
        let catalog = Arc::new(OfflineCatalog::default());
        let orch = orchestrator(&["eastus"], vec![], catalog.clone());
        let (handle, token) = cancellation();
        handle.cancel();
        let summary = orch.run_with_cancel(token).await;
        assert_eq!(summary.state, SyncState::Failed);
        assert!(summary.cancelled);
        assert_eq!(summary.queries_skipped, 1);
        assert_eq!(catalog.price_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_does_not_leak_into_the_next_run() {
        let catalog = Arc::new(OfflineCatalog::default());
        let orch = orchestrator(&["eastus"], vec![], catalog.clone());
        let (handle, token) = cancellation();
        handle.cancel();
        assert!(orch.run_with_cancel(token).await.cancelled);

        let next = orch.run().await;
        assert_eq!(next.state, SyncState::Done);
        assert!(!next.cancelled);
        assert_eq!(next.queries_skipped, 0);
        assert_eq!(next.reconciled_created, 2);

        // same orchestrator, same codes: a plain update pass
        let again = orch.run().await;
        assert_eq!(again.reconciled_updated, 2);
        assert_eq!(catalog.price_count(), 2);
    }

    #[tokio::test]
    async fn snapshots_cover_raw_prices_and_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(OfflineCatalog::default());
        let summary = orchestrator(&["eastus"], vec![], catalog)
            .with_snapshots(SnapshotWriter::new(dir.path(), Local::now()))
            .run()
            .await;
        assert_eq!(summary.snapshot_files.len(), 3);
        assert!(summary.snapshot_files.iter().all(|p| p.exists()));
    }
}

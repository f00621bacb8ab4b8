//! Dry-run helpers behind the `sample` and `check` commands.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::destination::HttpCatalog;
use crate::http::build_client;
use crate::model::{PricingRecord, Provider};
use crate::normalization::NormalizeContext;
use crate::providers::build_source;
use crate::snapshot::SnapshotWriter;

pub const SAMPLE_PAGES: u32 = 2;
pub const SAMPLE_ITEMS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub query: String,
    pub fetched: usize,
    pub normalized: usize,
    pub failed: usize,
    pub files: Vec<std::path::PathBuf>,
}

/// Fetches a couple of pages for the first Azure service/region, normalizes
/// the first few items and writes both sides to `writer`.
pub async fn sample(cfg: &SyncConfig, writer: &SnapshotWriter) -> Result<SampleReport> {
    let http = build_client(&cfg.source_http())?;
    let source = build_source(Provider::Azure, cfg, &http)?;
    let query = source
        .queries
        .first()
        .cloned()
        .context("no Azure service/region configured")?;
    let fetcher = source.fetcher.clone().with_page_limit(SAMPLE_PAGES);

    info!(query = %query.label(), pages = SAMPLE_PAGES, "fetching sample");
    let items = fetcher
        .fetch(&query)
        .await
        .with_context(|| format!("fetch sample for {}", query.label()))?;

    let ctx = NormalizeContext {
        prefix: &cfg.prefix,
        currency: &cfg.currency,
        service: &query.service,
        region: &query.region,
    };
    let head = &items[..items.len().min(SAMPLE_ITEMS)];
    let mut records: Vec<PricingRecord> = Vec::new();
    let mut failed = 0usize;
    for item in head {
        match source.normalizer.normalize(item, &ctx) {
            Ok(rec) => records.push(rec),
            Err(err) => {
                warn!(error = %err, "sample item skipped");
                failed += 1;
            }
        }
    }

    if let Some(first) = head.first() {
        info!(
            product = first.str_field("productName").unwrap_or("-"),
            meter = first.str_field("meterName").unwrap_or("-"),
            price = %first.get("retailPrice").cloned().unwrap_or_default(),
            unit = first.str_field("unitOfMeasure").unwrap_or("-"),
            "sample raw item"
        );
    }
    if let Some(rec) = records.first() {
        info!(
            name = %rec.name,
            code = %rec.code,
            kind = rec.price_kind.as_str(),
            unit = rec.unit.as_str(),
            price = %rec.unit_price,
            "sample normalized record"
        );
    }

    let files = vec![
        writer.write_json(&writer.path_for(Provider::Azure, "sample_raw"), head)?,
        writer.write_json(&writer.path_for(Provider::Azure, "sample_prices"), &records)?,
    ];

    Ok(SampleReport {
        query: query.label(),
        fetched: items.len(),
        normalized: records.len(),
        failed,
        files,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub target: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub probes: Vec<ProbeResult>,
}

impl CheckReport {
    pub fn all_ok(&self) -> bool {
        !self.probes.is_empty() && self.probes.iter().all(|p| p.ok)
    }

    fn push(&mut self, target: impl Into<String>, outcome: Result<String, String>) {
        let target = target.into();
        let (ok, detail) = match outcome {
            Ok(detail) => {
                info!(probe = %target, detail = %detail, "check passed");
                (true, detail)
            }
            Err(detail) => {
                warn!(probe = %target, detail = %detail, "check failed");
                (false, detail)
            }
        };
        self.probes.push(ProbeResult { target, ok, detail });
    }
}

/// Destination connectivity plus one page from every enabled provider.
pub async fn check(cfg: &SyncConfig) -> Result<CheckReport> {
    let mut report = CheckReport::default();

    match HttpCatalog::from_config(cfg) {
        Ok(catalog) => {
            let outcome = catalog
                .ping()
                .await
                .map(|n| format!("{n} price(s) listed"))
                .map_err(|e| e.to_string());
            report.push("destination", outcome);
        }
        Err(err) => report.push("destination", Err(err.to_string())),
    }

    let http = build_client(&cfg.source_http())?;
    for provider in &cfg.providers {
        let outcome = match build_source(*provider, cfg, &http) {
            Ok(source) => match source.queries.first() {
                Some(query) => source
                    .fetcher
                    .clone()
                    .with_page_limit(1)
                    .fetch(query)
                    .await
                    .map(|items| {
                        format!("{} item(s) on first page of {}", items.len(), query.label())
                    })
                    .map_err(|e| e.to_string()),
                None => Err("no query configured".to_string()),
            },
            Err(err) => Err(err.to_string()),
        };
        report.push(provider.to_string(), outcome);
    }

    Ok(report)
}

//! Provider catalogs: which queries to run, how their pages are walked and
//! how their records are normalized.

pub mod aws;
pub mod azure;
pub mod gcp;

use std::sync::Arc;

use reqwest::Client;

use crate::config::SyncConfig;
use crate::error::ConfigError;
use crate::fetch::{HttpPageSource, PaginatedFetcher, SourceQuery};
use crate::http::build_client;
use crate::model::Provider;
use crate::normalization::Normalizer;

/// Everything the orchestrator needs to pull one provider into the pipeline.
#[derive(Clone)]
pub struct ProviderSource {
    pub provider: Provider,
    pub queries: Vec<SourceQuery>,
    pub fetcher: PaginatedFetcher,
    pub normalizer: Arc<dyn Normalizer>,
}

impl std::fmt::Debug for ProviderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSource")
            .field("provider", &self.provider)
            .field("queries", &self.queries.len())
            .field("page_limit", &self.fetcher.page_limit())
            .finish()
    }
}

/// One source per enabled provider, in configuration order.
pub fn build_sources(cfg: &SyncConfig) -> Result<Vec<ProviderSource>, ConfigError> {
    let http = build_client(&cfg.source_http())?;
    cfg.providers
        .iter()
        .map(|provider| build_source(*provider, cfg, &http))
        .collect()
}

pub fn build_source(
    provider: Provider,
    cfg: &SyncConfig,
    http: &Client,
) -> Result<ProviderSource, ConfigError> {
    let fetcher = |source: HttpPageSource| {
        PaginatedFetcher::new(
            Arc::new(source),
            cfg.retry.clone(),
            cfg.max_pages,
            cfg.page_delay,
        )
    };

    let built = match provider {
        Provider::Azure => ProviderSource {
            provider,
            queries: azure::queries(&cfg.azure.services, &cfg.azure.regions, &cfg.currency),
            fetcher: fetcher(HttpPageSource::new(
                http.clone(),
                cfg.azure.endpoint.clone(),
                azure::CURSOR_STYLE,
            )),
            normalizer: Arc::new(azure::AzureNormalizer::default()),
        },
        Provider::Gcp => {
            let key = cfg
                .gcp
                .api_key
                .as_deref()
                .ok_or(ConfigError::Missing("GCP_API_KEY"))?;
            ProviderSource {
                provider,
                queries: vec![gcp::query(
                    &cfg.gcp.service_id,
                    &cfg.gcp.region,
                    key,
                    &cfg.currency,
                )],
                fetcher: fetcher(HttpPageSource::new(
                    http.clone(),
                    gcp::skus_endpoint(&cfg.gcp.api_base, &cfg.gcp.service_id),
                    gcp::CURSOR_STYLE,
                )),
                normalizer: Arc::new(gcp::GcpNormalizer::new(cfg.gcp.resource_groups.clone())),
            }
        }
        Provider::Aws => {
            let endpoint = cfg
                .aws
                .endpoint
                .as_deref()
                .ok_or(ConfigError::Missing("AWS_PRICING_URL"))?;
            ProviderSource {
                provider,
                queries: vec![aws::query(
                    &cfg.aws.service_code,
                    &cfg.aws.region,
                    &cfg.currency,
                )],
                fetcher: fetcher(HttpPageSource::new(
                    http.clone(),
                    endpoint,
                    aws::CURSOR_STYLE,
                )),
                normalizer: Arc::new(aws::AwsNormalizer::default()),
            }
        }
    };
    Ok(built)
}

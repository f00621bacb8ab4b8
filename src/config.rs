//! Run configuration, read from the environment (after `.env`) and then
//! overridden by command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::http::HttpOptions;
use crate::model::Provider;
use crate::providers::{azure, gcp};
use crate::retry::RetryPolicy;
use crate::util::env::{env_flag, env_list, env_opt, env_parse, split_list};

pub const DEFAULT_AZURE_REGIONS: [&str; 5] = [
    "eastus",
    "westus2",
    "westeurope",
    "southeastasia",
    "australiaeast",
];

pub const DEFAULT_AZURE_SERVICES: [&str; 6] = [
    "Virtual Machines",
    "Storage",
    "Bandwidth",
    "Azure SQL Database",
    "Azure Database for MySQL",
    "Azure Database for PostgreSQL",
];

/// Keys logged (redacted) by the preflight snapshot.
pub const PREFLIGHT_KEYS: &[&str] = &[
    "DESTINATION_URL",
    "DESTINATION_TOKEN",
    "PRICE_PREFIX",
    "SKIP_SSL_VERIFY",
    "SYNC_CURRENCY",
    "SYNC_PROVIDERS",
    "AZURE_REGIONS",
    "AZURE_SERVICES",
    "GCP_API_KEY",
    "GCP_REGION",
    "GCP_SERVICE_ID",
    "AWS_PRICING_URL",
    "AWS_SERVICE_CODE",
    "AWS_REGION",
    "MAX_PAGES",
    "PAGE_DELAY_MS",
    "MAX_RETRIES",
    "RETRY_BASE_DELAY_MS",
    "HTTP_TIMEOUT_SECS",
    "FETCH_CONCURRENCY",
    "RECONCILE_CONCURRENCY",
];

#[derive(Debug, Clone)]
pub struct DestinationConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub verify_tls: bool,
}

impl DestinationConfig {
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .ok_or(ConfigError::Missing("DESTINATION_URL"))
    }
}

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub endpoint: String,
    pub services: Vec<String>,
    pub regions: Vec<String>,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: azure::DEFAULT_ENDPOINT.to_string(),
            services: DEFAULT_AZURE_SERVICES.iter().map(|s| s.to_string()).collect(),
            regions: DEFAULT_AZURE_REGIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GcpConfig {
    pub api_base: String,
    pub service_id: String,
    pub api_key: Option<String>,
    pub region: String,
    pub resource_groups: Vec<String>,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            api_base: gcp::DEFAULT_API_BASE.to_string(),
            service_id: gcp::DEFAULT_SERVICE_ID.to_string(),
            api_key: None,
            region: "asia-southeast1".to_string(),
            resource_groups: gcp::DEFAULT_RESOURCE_GROUPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AwsConfig {
    /// Paginated price-list endpoint; there is no public default.
    pub endpoint: Option<String>,
    pub service_code: String,
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_code: crate::providers::aws::DEFAULT_SERVICE_CODE.to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub prefix: String,
    pub currency: String,
    pub providers: Vec<Provider>,
    pub destination: DestinationConfig,
    pub azure: AzureConfig,
    pub gcp: GcpConfig,
    pub aws: AwsConfig,
    pub retry: RetryPolicy,
    pub max_pages: u32,
    pub page_delay: Duration,
    pub http_timeout: Duration,
    pub fetch_concurrency: usize,
    pub reconcile_concurrency: usize,
    /// Where snapshot files go; no snapshots when unset.
    pub output_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefix: "sync".to_string(),
            currency: "USD".to_string(),
            providers: vec![Provider::Azure],
            destination: DestinationConfig {
                base_url: None,
                token: None,
                verify_tls: true,
            },
            azure: AzureConfig::default(),
            gcp: GcpConfig::default(),
            aws: AwsConfig::default(),
            retry: RetryPolicy::default(),
            max_pages: 30,
            page_delay: Duration::from_millis(200),
            http_timeout: Duration::from_secs(30),
            fetch_concurrency: 4,
            reconcile_concurrency: 8,
            output_dir: None,
        }
    }
}

impl SyncConfig {
    /// Reads every key; call [`SyncConfig::validate`] once flag overrides are applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let providers = match env_opt("SYNC_PROVIDERS") {
            Some(raw) => parse_providers(&raw)?,
            None => defaults.providers.clone(),
        };

        Ok(Self {
            prefix: env_opt("PRICE_PREFIX").unwrap_or(defaults.prefix),
            currency: env_opt("SYNC_CURRENCY").unwrap_or(defaults.currency),
            providers,
            destination: DestinationConfig {
                base_url: env_opt("DESTINATION_URL")
                    .map(|u| u.trim_end_matches('/').to_string()),
                token: env_opt("DESTINATION_TOKEN"),
                verify_tls: !env_flag("SKIP_SSL_VERIFY", false),
            },
            azure: AzureConfig {
                endpoint: env_opt("AZURE_PRICES_URL").unwrap_or(defaults.azure.endpoint),
                services: env_list("AZURE_SERVICES", &DEFAULT_AZURE_SERVICES),
                regions: env_list("AZURE_REGIONS", &DEFAULT_AZURE_REGIONS),
            },
            gcp: GcpConfig {
                api_base: env_opt("GCP_API_BASE").unwrap_or(defaults.gcp.api_base),
                service_id: env_opt("GCP_SERVICE_ID").unwrap_or(defaults.gcp.service_id),
                api_key: env_opt("GCP_API_KEY"),
                region: env_opt("GCP_REGION").unwrap_or(defaults.gcp.region),
                resource_groups: env_list(
                    "GCP_RESOURCE_GROUPS",
                    &gcp::DEFAULT_RESOURCE_GROUPS,
                ),
            },
            aws: AwsConfig {
                endpoint: env_opt("AWS_PRICING_URL"),
                service_code: env_opt("AWS_SERVICE_CODE").unwrap_or(defaults.aws.service_code),
                region: env_opt("AWS_REGION").unwrap_or(defaults.aws.region),
            },
            retry: RetryPolicy::new(
                env_parse("MAX_RETRIES", defaults.retry.max_attempts),
                Duration::from_millis(env_parse(
                    "RETRY_BASE_DELAY_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )),
            ),
            max_pages: env_parse("MAX_PAGES", defaults.max_pages),
            page_delay: Duration::from_millis(env_parse(
                "PAGE_DELAY_MS",
                defaults.page_delay.as_millis() as u64,
            )),
            http_timeout: Duration::from_secs(env_parse(
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )),
            fetch_concurrency: env_parse("FETCH_CONCURRENCY", defaults.fetch_concurrency),
            reconcile_concurrency: env_parse(
                "RECONCILE_CONCURRENCY",
                defaults.reconcile_concurrency,
            ),
            output_dir: env_opt("SYNC_OUTPUT_DIR").map(PathBuf::from),
        })
    }

    /// Checks everything the pipeline needs before it starts; destination
    /// settings are checked separately because offline runs do not need them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.trim().is_empty() {
            return Err(ConfigError::Missing("PRICE_PREFIX"));
        }
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SYNC_PROVIDERS",
                reason: "no provider enabled".to_string(),
            });
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "FETCH_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.reconcile_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "RECONCILE_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.providers.contains(&Provider::Azure)
            && (self.azure.services.is_empty() || self.azure.regions.is_empty())
        {
            return Err(ConfigError::Invalid {
                key: "AZURE_SERVICES",
                reason: "azure needs at least one service and region".to_string(),
            });
        }
        if self.providers.contains(&Provider::Gcp) && self.gcp.api_key.is_none() {
            return Err(ConfigError::Missing("GCP_API_KEY"));
        }
        if self.providers.contains(&Provider::Aws) && self.aws.endpoint.is_none() {
            return Err(ConfigError::Missing("AWS_PRICING_URL"));
        }
        Ok(())
    }

    /// Options for the anonymous provider catalog clients.
    pub fn source_http(&self) -> HttpOptions {
        HttpOptions {
            timeout: self.http_timeout,
            verify_tls: true,
            bearer: None,
        }
    }

    pub fn destination_http(&self) -> HttpOptions {
        HttpOptions {
            timeout: self.http_timeout,
            verify_tls: self.destination.verify_tls,
            bearer: self.destination.token.clone(),
        }
    }
}

pub fn parse_providers(raw: &str) -> Result<Vec<Provider>, ConfigError> {
    let mut out = Vec::new();
    for name in split_list(raw) {
        let provider = Provider::parse(&name).ok_or_else(|| ConfigError::Invalid {
            key: "SYNC_PROVIDERS",
            reason: format!("unknown provider `{name}`"),
        })?;
        if !out.contains(&provider) {
            out.push(provider);
        }
    }
    Ok(out)
}

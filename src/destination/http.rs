use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::payload::{bundle_payload, price_payload};
use super::CatalogDestination;
use crate::config::SyncConfig;
use crate::error::{BundleError, ConfigError, FailureClass, ReconcileError};
use crate::http::{build_client, send_json, truncate_for_log, HttpFailure};
use crate::model::{Bundle, DestinationId, PricingRecord};

/// REST client for the destination catalog (`/prices`, `/price-bundles`).
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    http: Client,
    base_url: String,
    prefix: String,
}

impl HttpCatalog {
    pub fn new(http: Client, base_url: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(cfg: &SyncConfig) -> Result<Self, ConfigError> {
        let base_url = cfg.destination.require_url()?;
        let http = build_client(&cfg.destination_http())?;
        Ok(Self::new(http, base_url, cfg.prefix.clone()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Connectivity check: lists a single price. Returns how many came back.
    pub async fn ping(&self) -> Result<usize, HttpFailure> {
        let body = send_json(self.http.get(self.url("prices")).query(&[("max", "1")])).await?;
        let count = body
            .get("prices")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        info!(base_url = %self.base_url, count, "destination reachable");
        Ok(count)
    }
}

/// `success: false` is a definitive rejection even on HTTP 200.
fn ensure_success(body: &Value) -> Result<(), String> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let msg = body
            .get("msg")
            .or_else(|| body.get("message"))
            .or_else(|| body.get("errors"))
            .map(|v| truncate_for_log(v.to_string(), 300))
            .unwrap_or_else(|| "success=false".to_string());
        return Err(msg);
    }
    Ok(())
}

fn id_value(v: &Value) -> Option<DestinationId> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Id from `{ id }`, `{ price: { id } }` or `{ priceSet: { id } }`.
fn extract_id(body: &Value) -> Option<DestinationId> {
    body.get("id")
        .and_then(id_value)
        .or_else(|| body.pointer("/price/id").and_then(id_value))
        .or_else(|| body.pointer("/priceSet/id").and_then(id_value))
}

fn reconcile_err(code: &str, failure: HttpFailure) -> ReconcileError {
    ReconcileError {
        class: failure.class,
        code: code.to_string(),
        reason: failure.to_string(),
    }
}

#[async_trait]
impl CatalogDestination for HttpCatalog {
    async fn find_price(&self, code: &str) -> Result<Option<DestinationId>, ReconcileError> {
        let body = send_json(self.http.get(self.url("prices")).query(&[("code", code)]))
            .await
            .map_err(|f| reconcile_err(code, f))?;
        ensure_success(&body).map_err(|msg| ReconcileError::permanent(code, msg))?;
        let prices = body
            .get("prices")
            .and_then(Value::as_array)
            .ok_or_else(|| ReconcileError::permanent(code, "lookup response has no `prices` array"))?;
        // the lookup filter is not guaranteed to be exact
        let found = prices
            .iter()
            .filter(|p| p.get("code").and_then(Value::as_str) == Some(code))
            .find_map(|p| p.get("id").and_then(id_value));
        debug!(code, found = ?found, candidates = prices.len(), "price lookup");
        Ok(found)
    }

    async fn create_price(&self, record: &PricingRecord) -> Result<DestinationId, ReconcileError> {
        let code = record.code.as_str();
        let body = send_json(
            self.http
                .post(self.url("prices"))
                .json(&price_payload(record, &self.prefix)),
        )
        .await
        .map_err(|f| reconcile_err(code, f))?;
        ensure_success(&body).map_err(|msg| ReconcileError::permanent(code, msg))?;
        extract_id(&body)
            .ok_or_else(|| ReconcileError::permanent(code, "create response carries no id"))
    }

    async fn update_price(
        &self,
        id: DestinationId,
        record: &PricingRecord,
    ) -> Result<(), ReconcileError> {
        let code = record.code.as_str();
        let body = send_json(
            self.http
                .put(self.url(&format!("prices/{id}")))
                .json(&price_payload(record, &self.prefix)),
        )
        .await
        .map_err(|f| reconcile_err(code, f))?;
        ensure_success(&body).map_err(|msg| ReconcileError::permanent(code, msg))
    }

    async fn create_bundle(&self, bundle: &Bundle) -> Result<Option<DestinationId>, BundleError> {
        let body = send_json(
            self.http
                .post(self.url("price-bundles"))
                .json(&bundle_payload(bundle)),
        )
        .await
        .map_err(|f| BundleError {
            class: f.class,
            code: bundle.code.clone(),
            reason: f.to_string(),
        })?;
        ensure_success(&body).map_err(|msg| BundleError {
            class: FailureClass::Permanent,
            code: bundle.code.clone(),
            reason: msg,
        })?;
        Ok(extract_id(&body))
    }
}

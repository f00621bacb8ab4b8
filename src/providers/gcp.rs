//! Google Cloud Billing Catalog API (`cloudbilling.googleapis.com/v1`).

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::error::NormalizationError;
use crate::fetch::{CursorStyle, SourceQuery};
use crate::model::{GroupKey, PriceKind, PricingRecord, Provider, RawCatalogItem, VolumeType};
use crate::normalization::platform::detect_platform;
use crate::normalization::rules::{ClassificationRules, ClassifyInput, KeywordSet};
use crate::normalization::{
    ensure_object, price_code, price_unit_for, require, NormalizeContext, Normalizer,
};

pub const DEFAULT_API_BASE: &str = "https://cloudbilling.googleapis.com/v1";
/// Compute Engine.
pub const DEFAULT_SERVICE_ID: &str = "6F81-5844-456A";
pub const CURSOR_STYLE: CursorStyle = CursorStyle::GCP;

pub const DEFAULT_RESOURCE_GROUPS: [&str; 6] =
    ["CPU", "RAM", "GPU", "LocalSSD", "N1Standard", "N2Standard"];

pub const KEYWORDS: KeywordSet = KeywordSet {
    platform: &["windows"],
    storage: &["storage", "disk", "ssd"],
    gpu: &["gpu"],
    memory: &["ram", "memory"],
    cores: &["core", "cpu"],
};

const INSTANCE_PREFIXES: [&str; 3] = ["n1-", "n2-", "e2-"];

pub fn skus_endpoint(api_base: &str, service_id: &str) -> String {
    format!("{}/services/{}/skus", api_base.trim_end_matches('/'), service_id)
}

pub fn query(service_id: &str, region: &str, api_key: &str, currency: &str) -> SourceQuery {
    SourceQuery::new(
        Provider::Gcp,
        service_id,
        region,
        vec![
            ("key".to_string(), api_key.to_string()),
            ("pageSize".to_string(), "100".to_string()),
            ("currencyCode".to_string(), currency.to_string()),
        ],
    )
}

/// SKUs are filtered client side: the catalog API has no region filter.
#[derive(Debug, Clone)]
pub struct GcpNormalizer {
    rules: ClassificationRules,
    resource_family: String,
    resource_groups: Vec<String>,
}

impl GcpNormalizer {
    pub fn new(resource_groups: Vec<String>) -> Self {
        Self {
            rules: ClassificationRules::with_keywords(&KEYWORDS),
            resource_family: "Compute".to_string(),
            resource_groups,
        }
    }
}

impl Default for GcpNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE_GROUPS.iter().map(|s| s.to_string()).collect())
    }
}

impl Normalizer for GcpNormalizer {
    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn accepts(&self, raw: &RawCatalogItem, ctx: &NormalizeContext<'_>) -> bool {
        let in_region = raw
            .get("serviceRegions")
            .and_then(Value::as_array)
            .is_some_and(|regions| regions.iter().any(|r| r.as_str() == Some(ctx.region)));
        let family_ok =
            raw.str_at(&["category", "resourceFamily"]) == Some(self.resource_family.as_str());
        let group_ok = raw
            .str_at(&["category", "resourceGroup"])
            .is_some_and(|g| self.resource_groups.iter().any(|allowed| allowed == g));
        in_region && family_ok && group_ok
    }

    fn normalize(
        &self,
        raw: &RawCatalogItem,
        ctx: &NormalizeContext<'_>,
    ) -> Result<PricingRecord, NormalizationError> {
        ensure_object(raw)?;
        let sku_id = require(raw, "skuId")?;
        let region = Some(ctx.region.trim())
            .filter(|r| !r.is_empty())
            .ok_or(NormalizationError::MissingAttribute("serviceRegions"))?;
        let description = raw.str_field("description").unwrap_or_default();
        let resource_group = raw
            .str_at(&["category", "resourceGroup"])
            .unwrap_or_default();
        let service = raw
            .str_at(&["category", "serviceDisplayName"])
            .unwrap_or(ctx.service);

        let expression = raw
            .pointer(&["pricingInfo"])
            .and_then(Value::as_array)
            .and_then(|infos| infos.first())
            .and_then(|info| info.get("pricingExpression"))
            .ok_or(NormalizationError::MissingAttribute("pricingInfo"))?;
        let rate = expression
            .get("tieredRates")
            .and_then(Value::as_array)
            .and_then(|rates| rates.first())
            .and_then(|rate| rate.get("unitPrice"))
            .ok_or(NormalizationError::MissingAttribute("tieredRates"))?;
        let unit_price = money_to_decimal(rate)?;
        let unit_text = expression
            .get("usageUnitDescription")
            .or_else(|| expression.get("usageUnit"))
            .and_then(Value::as_str)
            .unwrap_or("hour");

        let price_kind = self
            .rules
            .classify(&ClassifyInput::new(service, resource_group, description));
        let family = instance_type(description).unwrap_or_else(|| resource_group.to_string());
        let volume_type = (price_kind == PriceKind::Storage)
            .then(|| VolumeType::from_text(&format!("{description} {resource_group}")));
        let currency = rate
            .get("currencyCode")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .unwrap_or(ctx.currency);

        Ok(PricingRecord {
            name: format!("{} - {description} - {region}", ctx.prefix),
            code: price_code(ctx.prefix, Provider::Gcp, sku_id, region),
            price_kind,
            unit: price_unit_for(price_kind, unit_text),
            unit_price,
            currency: currency.to_string(),
            platform: detect_platform([description]),
            group_key: GroupKey::new(Provider::Gcp, family, region.to_lowercase()),
            provider: Provider::Gcp,
            region: region.to_lowercase(),
            volume_type,
        })
    }
}

/// `{ units: "1", nanos: 500000000 }` -> `1.5`. `units` is an int64 encoded as
/// a string by the API, but plain numbers are accepted too.
fn money_to_decimal(money: &Value) -> Result<BigDecimal, NormalizationError> {
    let invalid = || NormalizationError::InvalidAttribute {
        field: "unitPrice",
        value: money.to_string(),
    };
    let units = match money.get("units") {
        None | Some(Value::Null) => BigDecimal::from(0),
        Some(Value::String(s)) => BigDecimal::from_str(s.trim()).map_err(|_| invalid())?,
        Some(Value::Number(n)) => n.as_i64().map(BigDecimal::from).ok_or_else(invalid)?,
        Some(_) => return Err(invalid()),
    };
    let nanos = match money.get("nanos") {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_i64().ok_or_else(invalid)?,
    };
    Ok(units + BigDecimal::new(nanos.into(), 9))
}

/// `n1-standard-4` style token from an instance SKU description.
fn instance_type(description: &str) -> Option<String> {
    let lower = description.to_lowercase();
    if !lower.contains("instance") {
        return None;
    }
    lower
        .split_whitespace()
        .find(|part| INSTANCE_PREFIXES.iter().any(|p| part.starts_with(p)))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceUnit;
    use serde_json::json;

    fn ctx() -> NormalizeContext<'static> {
        NormalizeContext {
            prefix: "acme",
            currency: "USD",
            service: DEFAULT_SERVICE_ID,
            region: "asia-southeast1",
        }
    }

    fn sku(group: &str, description: &str, units: &str, nanos: i64) -> RawCatalogItem {
        RawCatalogItem::new(json!({
            "skuId": "ABCD-1234",
            "description": description,
            "category": {
                "serviceDisplayName": "Compute Engine",
                "resourceFamily": "Compute",
                "resourceGroup": group
            },
            "serviceRegions": ["asia-southeast1"],
            "pricingInfo": [{
                "pricingExpression": {
                    "usageUnit": "h",
                    "usageUnitDescription": "hour",
                    "tieredRates": [{
                        "startUsageAmount": 0,
                        "unitPrice": {"currencyCode": "USD", "units": units, "nanos": nanos}
                    }]
                }
            }]
        }))
    }

    #[test]
    fn units_and_nanos_are_combined() {
        let raw = sku("CPU", "N1 Predefined Instance Core running in Singapore", "1", 250_000_000);
        let rec = GcpNormalizer::default().normalize(&raw, &ctx()).unwrap();
        assert_eq!(rec.unit_price, BigDecimal::from_str("1.25").unwrap());
        assert_eq!(rec.price_kind, PriceKind::Cores);
        assert_eq!(rec.unit, PriceUnit::Hour);
        assert_eq!(rec.code, "acme.google.ABCD-1234.asia-southeast1");
    }

    #[test]
    fn ram_and_local_ssd_classification() {
        let n = GcpNormalizer::default();
        let ram = n
            .normalize(&sku("RAM", "N1 Predefined Instance Ram", "0", 4_000_000), &ctx())
            .unwrap();
        assert_eq!(ram.price_kind, PriceKind::Memory);
        let ssd = n
            .normalize(&sku("LocalSSD", "SSD backed Local Storage", "0", 80_000_000), &ctx())
            .unwrap();
        assert_eq!(ssd.price_kind, PriceKind::Storage);
        assert_eq!(ssd.volume_type, Some(VolumeType::PremiumSsd));
    }

    #[test]
    fn family_uses_instance_token_then_resource_group() {
        let rec = GcpNormalizer::default()
            .normalize(
                &sku("N1Standard", "Instance n1-standard-4 running in Singapore", "0", 1),
                &ctx(),
            )
            .unwrap();
        assert_eq!(rec.group_key.family, "n1-standard-4");

        let rec = GcpNormalizer::default()
            .normalize(&sku("GPU", "Nvidia Tesla T4 GPU", "0", 1), &ctx())
            .unwrap();
        assert_eq!(rec.group_key.family, "GPU");
    }

    #[test]
    fn filter_checks_region_family_and_group() {
        let n = GcpNormalizer::default();
        assert!(n.accepts(&sku("CPU", "core", "0", 1), &ctx()));
        assert!(!n.accepts(&sku("Network", "egress", "0", 1), &ctx()));

        let other_region = NormalizeContext {
            region: "us-central1",
            ..ctx()
        };
        assert!(!n.accepts(&sku("CPU", "core", "0", 1), &other_region));
    }

    #[test]
    fn missing_rates_are_rejected() {
        let raw = RawCatalogItem::new(json!({
            "skuId": "X",
            "pricingInfo": [{"pricingExpression": {"tieredRates": []}}]
        }));
        let err = GcpNormalizer::default().normalize(&raw, &ctx()).unwrap_err();
        assert_eq!(err, NormalizationError::MissingAttribute("tieredRates"));
    }
}

//! AWS price list products (`GetProducts` shape) served by a paginated
//! `{ items, nextCursor }` endpoint.

use serde_json::Value;

use crate::error::NormalizationError;
use crate::fetch::{CursorStyle, SourceQuery};
use crate::model::{GroupKey, PriceKind, PricingRecord, Provider, RawCatalogItem, VolumeType};
use crate::normalization::platform::detect_platform;
use crate::normalization::rules::{ClassificationRules, ClassifyInput, KeywordSet};
use crate::normalization::{
    decimal_from_value, ensure_object, price_code, price_unit_for, NormalizeContext, Normalizer,
};

pub const CURSOR_STYLE: CursorStyle = CursorStyle::GENERIC;
pub const DEFAULT_SERVICE_CODE: &str = "AmazonEC2";

pub const KEYWORDS: KeywordSet = KeywordSet {
    platform: &["windows"],
    storage: &["storage", "ebs", "volume"],
    gpu: &["gpu"],
    memory: &["memory"],
    cores: &["vcpu"],
};

pub fn query(service_code: &str, region: &str, currency: &str) -> SourceQuery {
    SourceQuery::new(
        Provider::Aws,
        service_code,
        region,
        vec![
            ("serviceCode".to_string(), service_code.to_string()),
            ("regionCode".to_string(), region.to_string()),
            ("currencyCode".to_string(), currency.to_string()),
        ],
    )
}

#[derive(Debug, Clone)]
pub struct AwsNormalizer {
    rules: ClassificationRules,
}

impl Default for AwsNormalizer {
    fn default() -> Self {
        Self {
            rules: ClassificationRules::with_keywords(&KEYWORDS),
        }
    }
}

impl Normalizer for AwsNormalizer {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    /// Price lists mix services; only the queried service code is kept.
    fn accepts(&self, raw: &RawCatalogItem, ctx: &NormalizeContext<'_>) -> bool {
        match raw.str_at(&["product", "attributes", "servicecode"]) {
            Some(code) => code.eq_ignore_ascii_case(ctx.service),
            None => true,
        }
    }

    fn normalize(
        &self,
        raw: &RawCatalogItem,
        ctx: &NormalizeContext<'_>,
    ) -> Result<PricingRecord, NormalizationError> {
        ensure_object(raw)?;
        let sku = raw
            .str_at(&["product", "sku"])
            .ok_or(NormalizationError::MissingAttribute("product.sku"))?;
        let attr = |key: &str| raw.str_at(&["product", "attributes", key]);
        let region = attr("regionCode")
            .or_else(|| Some(ctx.region.trim()).filter(|r| !r.is_empty()))
            .ok_or(NormalizationError::MissingAttribute("regionCode"))?;

        let dimension = on_demand_dimension(raw)
            .ok_or(NormalizationError::MissingAttribute("terms.OnDemand"))?;
        let (currency, price_value) = dimension
            .get("pricePerUnit")
            .and_then(|p| quoted_price(p, ctx.currency))
            .ok_or(NormalizationError::MissingAttribute("pricePerUnit"))?;
        let unit_price =
            decimal_from_value(price_value).ok_or_else(|| NormalizationError::InvalidAttribute {
                field: "pricePerUnit",
                value: price_value.to_string(),
            })?;
        let unit_text = dimension
            .get("unit")
            .and_then(Value::as_str)
            .map(expand_unit)
            .unwrap_or_else(|| "hour".to_string());

        let product_family = raw
            .str_at(&["product", "productFamily"])
            .unwrap_or_default();
        let instance_type = attr("instanceType");
        let volume = attr("volumeApiName").or_else(|| attr("volumeType"));
        let os = attr("operatingSystem").unwrap_or_default();
        let label = instance_type.or(volume).unwrap_or(sku);

        // `instanceFamily` ("Memory optimized", "GPU instance") describes the
        // whole instance, which is still priced as compute.
        let price_kind = self
            .rules
            .classify(&ClassifyInput::new(product_family, label, os));
        let family = instance_type
            .or(volume)
            .unwrap_or(if product_family.is_empty() { sku } else { product_family });
        let volume_type = (price_kind == PriceKind::Storage).then(|| {
            VolumeType::from_text(&format!("{} {}", label, attr("volumeType").unwrap_or_default()))
        });
        let location = attr("location").unwrap_or(region);
        let name = if os.is_empty() {
            format!("{} - {label} - {location}", ctx.prefix)
        } else {
            format!("{} - {label} - {location} - {os}", ctx.prefix)
        };

        Ok(PricingRecord {
            name,
            code: price_code(ctx.prefix, Provider::Aws, sku, region),
            price_kind,
            unit: price_unit_for(price_kind, &unit_text),
            unit_price,
            currency: currency.to_string(),
            platform: detect_platform([os]),
            group_key: GroupKey::new(Provider::Aws, family, region.to_lowercase()),
            provider: Provider::Aws,
            region: region.to_lowercase(),
            volume_type,
        })
    }
}

/// Price in the configured currency, else the USD list price. Returns the
/// currency key actually used.
fn quoted_price<'a>(per_unit: &'a Value, currency: &'a str) -> Option<(&'a str, &'a Value)> {
    per_unit
        .get(currency)
        .map(|v| (currency, v))
        .or_else(|| per_unit.get("USD").map(|v| ("USD", v)))
}

/// First price dimension of the first on-demand term.
fn on_demand_dimension(raw: &RawCatalogItem) -> Option<&Value> {
    raw.pointer(&["terms", "OnDemand"])?
        .as_object()?
        .values()
        .next()?
        .get("priceDimensions")?
        .as_object()?
        .values()
        .next()
}

/// `GB-Mo` -> `gb-month`, so monthly storage is recognised.
fn expand_unit(unit: &str) -> String {
    let lower = unit.trim().to_lowercase();
    match lower.strip_suffix("-mo") {
        Some(head) => format!("{head}-month"),
        None => lower,
    }
}

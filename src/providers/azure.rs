//! Azure Retail Prices API (`prices.azure.com/api/retail/prices`).

use crate::error::NormalizationError;
use crate::fetch::{CursorStyle, SourceQuery};
use crate::model::{GroupKey, PriceKind, PricingRecord, Provider, RawCatalogItem, VolumeType};
use crate::normalization::platform::detect_platform;
use crate::normalization::rules::{ClassificationRules, ClassifyInput};
use crate::normalization::{
    decimal_from_value, ensure_object, price_code, price_unit_for, require, NormalizeContext,
    Normalizer,
};

pub const DEFAULT_ENDPOINT: &str = "https://prices.azure.com/api/retail/prices";
pub const CURSOR_STYLE: CursorStyle = CursorStyle::AZURE;

/// One query per (service, region), consumption prices only.
pub fn queries(services: &[String], regions: &[String], currency: &str) -> Vec<SourceQuery> {
    services
        .iter()
        .flat_map(|service| {
            regions.iter().map(move |region| {
                let filter = format!(
                    "serviceName eq '{service}' and armRegionName eq '{region}' and priceType eq 'Consumption'"
                );
                SourceQuery::new(
                    Provider::Azure,
                    service.clone(),
                    region.clone(),
                    vec![
                        ("currencyCode".to_string(), currency.to_string()),
                        ("$filter".to_string(), filter),
                    ],
                )
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct AzureNormalizer {
    rules: ClassificationRules,
}

/// Tiered meters repeat their `meterId` once per tier; tiers above zero get
/// a `.t<min units>` suffix so every row keeps its own code.
fn tiered_sku(meter_id: &str, raw: &RawCatalogItem) -> String {
    let tier = raw
        .get("tierMinimumUnits")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    if tier > 0.0 {
        format!("{meter_id}.t{tier}")
    } else {
        meter_id.to_string()
    }
}

impl Normalizer for AzureNormalizer {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    fn normalize(
        &self,
        raw: &RawCatalogItem,
        ctx: &NormalizeContext<'_>,
    ) -> Result<PricingRecord, NormalizationError> {
        ensure_object(raw)?;
        let meter_id = require(raw, "meterId")?;
        let region = raw
            .str_field("armRegionName")
            .or_else(|| Some(ctx.region.trim()).filter(|r| !r.is_empty()))
            .ok_or(NormalizationError::MissingAttribute("armRegionName"))?;

        let price_value = raw
            .get("retailPrice")
            .ok_or(NormalizationError::MissingAttribute("retailPrice"))?;
        let unit_price =
            decimal_from_value(price_value).ok_or_else(|| NormalizationError::InvalidAttribute {
                field: "retailPrice",
                value: price_value.to_string(),
            })?;

        let service = raw.str_field("serviceName").unwrap_or(ctx.service);
        let product = raw.str_field("productName").unwrap_or_default();
        let meter = raw.str_field("meterName").unwrap_or_default();
        let location = raw.str_field("location").unwrap_or(region);

        let price_kind = self
            .rules
            .classify(&ClassifyInput::new(service, product, meter));
        let unit = price_unit_for(
            price_kind,
            raw.str_field("unitOfMeasure").unwrap_or("1 Hour"),
        );
        let family = if product.is_empty() { service } else { product };
        let volume_type = (price_kind == PriceKind::Storage)
            .then(|| VolumeType::from_text(&format!("{meter} {product}")));

        Ok(PricingRecord {
            name: format!("{} - {product} - {meter} - {location}", ctx.prefix),
            code: price_code(ctx.prefix, Provider::Azure, &tiered_sku(meter_id, raw), region),
            price_kind,
            unit,
            unit_price,
            currency: raw
                .str_field("currencyCode")
                .unwrap_or(ctx.currency)
                .to_string(),
            platform: detect_platform([product, meter]),
            group_key: GroupKey::new(Provider::Azure, family, region.to_lowercase()),
            provider: Provider::Azure,
            region: region.to_lowercase(),
            volume_type,
        })
    }
}

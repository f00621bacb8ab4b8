//! Mapping of raw provider records into [`PricingRecord`]s.
//!
//! Provider modules implement [`Normalizer`]; the helpers here keep codes,
//! units and prices consistent across all of them.

pub mod platform;
pub mod rules;

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::error::NormalizationError;
use crate::model::{PriceKind, PriceUnit, PricingRecord, Provider, RawCatalogItem};

/// Per-query information a normalizer may need besides the raw item.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// Namespace prefix for codes and names (e.g. "acme").
    pub prefix: &'a str,
    pub currency: &'a str,
    /// Service the item was fetched for.
    pub service: &'a str,
    /// Region the item was fetched for.
    pub region: &'a str,
}

pub trait Normalizer: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether the item is within the configured scope at all. Declined items
    /// are counted as filtered, not as failures.
    fn accepts(&self, _raw: &RawCatalogItem, _ctx: &NormalizeContext<'_>) -> bool {
        true
    }

    fn normalize(
        &self,
        raw: &RawCatalogItem,
        ctx: &NormalizeContext<'_>,
    ) -> Result<PricingRecord, NormalizationError>;
}

/// `<prefix>.<provider>.<sku>.<region>`; deterministic for a given source record.
pub fn price_code(prefix: &str, provider: Provider, sku: &str, region: &str) -> String {
    format!(
        "{}.{}.{}.{}",
        prefix.trim().to_lowercase(),
        provider.code_slug(),
        sku.trim(),
        region.trim().to_lowercase()
    )
}

/// Hourly unless a storage price is quoted per month.
pub fn price_unit_for(kind: PriceKind, unit_of_measure: &str) -> PriceUnit {
    if kind == PriceKind::Storage && unit_of_measure.to_lowercase().contains("month") {
        PriceUnit::Month
    } else {
        PriceUnit::Hour
    }
}

/// Parses a JSON number or numeric string without going through `f64`, so
/// `0.192` stays exactly `0.192`.
pub fn decimal_from_value(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub(crate) fn require<'a>(
    raw: &'a RawCatalogItem,
    key: &'static str,
) -> Result<&'a str, NormalizationError> {
    raw.str_field(key)
        .ok_or(NormalizationError::MissingAttribute(key))
}

pub(crate) fn ensure_object(raw: &RawCatalogItem) -> Result<(), NormalizationError> {
    if raw.0.is_object() {
        Ok(())
    } else {
        Err(NormalizationError::NotAnObject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn code_is_lowercased_and_stable() {
        let a = price_code("Acme", Provider::Azure, "meter-1", "EastUS");
        let b = price_code("acme ", Provider::Azure, "meter-1", "eastus");
        assert_eq!(a, "acme.azure.meter-1.eastus");
        assert_eq!(a, b);
    }

    #[test]
    fn only_storage_is_priced_per_month() {
        assert_eq!(price_unit_for(PriceKind::Storage, "1/Month"), PriceUnit::Month);
        assert_eq!(price_unit_for(PriceKind::Storage, "1 GB"), PriceUnit::Hour);
        assert_eq!(price_unit_for(PriceKind::Compute, "1/Month"), PriceUnit::Hour);
    }

    #[test]
    fn decimals_keep_their_textual_value() {
        let d = decimal_from_value(&json!(0.192)).unwrap();
        assert_eq!(d, BigDecimal::from_str("0.192").unwrap());
        let s = decimal_from_value(&json!("1.50")).unwrap();
        assert_eq!(s, BigDecimal::from_str("1.5").unwrap());
        assert!(decimal_from_value(&json!(null)).is_none());
        assert!(decimal_from_value(&json!("n/a")).is_none());
    }
}

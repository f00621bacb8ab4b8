//! JSON bodies understood by the destination catalog.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::{json, Number, Value};

use crate::model::{Bundle, PriceKind, PricingRecord};

/// Decimal as a JSON number; the catalog rejects quoted prices.
fn decimal_number(d: &BigDecimal) -> Value {
    Number::from_str(&d.normalized().to_string())
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// `{ "price": { ... } }` for create and update calls.
pub fn price_payload(record: &PricingRecord, prefix: &str) -> Value {
    let price = decimal_number(&record.unit_price);
    let is_storage = record.price_kind == PriceKind::Storage;
    let additional_unit = is_storage.then_some("GB");
    let volume_type = record.volume_type.filter(|_| is_storage).map(|vt| {
        json!({
            "id": null,
            "code": format!("{}-{}", prefix.trim().to_lowercase(), vt.slug()),
            "name": vt.display_name(),
        })
    });

    json!({
        "price": {
            "name": record.name,
            "code": record.code,
            "active": true,
            "priceType": record.price_kind.as_str(),
            "priceUnit": record.unit.as_str(),
            "additionalPriceUnit": additional_unit,
            "price": price.clone(),
            "customPrice": 0,
            "markupType": null,
            "markup": 0,
            "markupPercent": 0,
            "cost": price,
            "currency": record.currency,
            "incurCharges": record.incur_charges(),
            "platform": record.platform.map(|p| p.as_str()),
            "software": null,
            "volumeType": volume_type,
            "datastore": null,
            "crossCloudApply": null,
            "account": null,
        }
    })
}

/// `{ "priceSet": { ... } }` for bundle creation.
pub fn bundle_payload(bundle: &Bundle) -> Value {
    json!({
        "priceSet": {
            "name": bundle.name,
            "code": bundle.code,
            "active": true,
            "priceUnit": "hour",
            "type": bundle.bundle_kind.as_str(),
            "regionCode": bundle.region_code,
            "systemCreated": true,
            "zone": null,
            "zonePool": null,
            "account": null,
            "prices": bundle.member_ids,
        }
    })
}

//! Canonical pricing types shared by every pipeline stage.

use std::fmt;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier assigned by the destination catalog.
pub type DestinationId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Azure,
    Gcp,
    Aws,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Azure, Provider::Gcp, Provider::Aws];

    /// Segment used inside price and bundle codes.
    pub fn code_slug(self) -> &'static str {
        match self {
            Provider::Azure => "azure",
            Provider::Gcp => "google",
            Provider::Aws => "amazon",
        }
    }

    /// Human label used inside bundle names.
    pub fn label(self) -> &'static str {
        match self {
            Provider::Azure => "Azure",
            Provider::Gcp => "Google",
            Provider::Aws => "Amazon",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "azure" => Some(Provider::Azure),
            "gcp" | "google" => Some(Provider::Gcp),
            "aws" | "amazon" => Some(Provider::Aws),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
            Provider::Aws => "aws",
        };
        f.write_str(s)
    }
}

/// One provider record exactly as the remote API returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCatalogItem(pub Value);

impl RawCatalogItem {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Walks a path of object keys.
    pub fn pointer(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.0, |v, key| v.get(key))
    }

    /// Non-empty string attribute.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.pointer(path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceKind {
    Compute,
    Storage,
    Memory,
    Cores,
    Gpu,
    Platform,
}

impl PriceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceKind::Compute => "compute",
            PriceKind::Storage => "storage",
            PriceKind::Memory => "memory",
            PriceKind::Cores => "cores",
            PriceKind::Gpu => "gpu",
            PriceKind::Platform => "platform",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceUnit {
    Hour,
    Month,
}

impl PriceUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceUnit::Hour => "hour",
            PriceUnit::Month => "month",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        }
    }
}

/// Disk tier attached to storage prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeType {
    PremiumSsd,
    StandardHdd,
    Standard,
}

impl VolumeType {
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if ["premium", "ssd"].iter().any(|k| lower.contains(k)) {
            VolumeType::PremiumSsd
        } else if ["standard", "hdd"].iter().any(|k| lower.contains(k)) {
            VolumeType::StandardHdd
        } else {
            VolumeType::Standard
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            VolumeType::PremiumSsd => "premium-ssd",
            VolumeType::StandardHdd => "standard-hdd",
            VolumeType::Standard => "standard",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            VolumeType::PremiumSsd => "Premium SSD",
            VolumeType::StandardHdd => "Standard HDD",
            VolumeType::Standard => "Standard",
        }
    }
}

/// Partition key for bundles: provider, service family and region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub provider: Provider,
    pub family: String,
    pub region: String,
}

impl GroupKey {
    pub fn new(provider: Provider, family: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            provider,
            family: family.into().trim().to_string(),
            region: region.into().trim().to_string(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.provider, self.family, self.region)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRecord {
    pub name: String,
    pub code: String,
    pub price_kind: PriceKind,
    pub unit: PriceUnit,
    pub unit_price: BigDecimal,
    pub currency: String,
    pub platform: Option<Platform>,
    pub group_key: GroupKey,
    pub provider: Provider,
    pub region: String,
    pub volume_type: Option<VolumeType>,
}

impl PricingRecord {
    pub fn incur_charges(&self) -> &'static str {
        if self.price_kind == PriceKind::Storage {
            "always"
        } else {
            "running"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledRecord {
    pub record: PricingRecord,
    pub destination_id: Option<DestinationId>,
    pub outcome: ReconcileOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconciledRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome != ReconcileOutcome::Failed && self.destination_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    Compute,
    Storage,
    ComputePlusStorage,
}

impl BundleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::Compute => "compute",
            BundleKind::Storage => "storage",
            BundleKind::ComputePlusStorage => "compute_plus_storage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub name: String,
    pub code: String,
    pub member_ids: Vec<DestinationId>,
    pub bundle_kind: BundleKind,
    pub region_code: String,
    pub group_key: GroupKey,
}

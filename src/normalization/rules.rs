//! Ordered keyword rule table used to classify every provider's records.
//!
//! Rules are evaluated top to bottom and the first match wins; when nothing
//! matches the record is priced as `compute`, which makes classification total.

use crate::model::PriceKind;

/// Which text attribute of a record a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Service,
    Product,
    Meter,
}

/// Lowercased text attributes of one record.
#[derive(Debug, Clone, Default)]
pub struct ClassifyInput {
    service: String,
    product: String,
    meter: String,
}

impl ClassifyInput {
    pub fn new(service: &str, product: &str, meter: &str) -> Self {
        Self {
            service: service.to_lowercase(),
            product: product.to_lowercase(),
            meter: meter.to_lowercase(),
        }
    }

    fn field(&self, field: Field) -> &str {
        match field {
            Field::Service => &self.service,
            Field::Product => &self.product,
            Field::Meter => &self.meter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub fields: &'static [Field],
    pub keywords: &'static [&'static str],
    pub kind: PriceKind,
}

impl Rule {
    fn matches(&self, input: &ClassifyInput) -> bool {
        self.fields.iter().any(|f| {
            let text = input.field(*f);
            self.keywords.iter().any(|k| text.contains(k))
        })
    }
}

/// Provider-specific keyword sets plugged into the shared precedence order.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    pub platform: &'static [&'static str],
    pub storage: &'static [&'static str],
    pub gpu: &'static [&'static str],
    pub memory: &'static [&'static str],
    pub cores: &'static [&'static str],
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self {
            platform: &["windows"],
            storage: &["storage", "disk", "blob", "file", "ssd"],
            gpu: &["gpu"],
            memory: &["ram", "memory"],
            cores: &["core", "cpu", "vcpu"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationRules {
    rules: Vec<Rule>,
}

impl ClassificationRules {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Platform markers, then resource family, then resource type.
    pub fn with_keywords(keywords: &KeywordSet) -> Self {
        const NAME_FIELDS: &[Field] = &[Field::Product, Field::Meter];
        const FAMILY_FIELDS: &[Field] = &[Field::Service, Field::Product];
        Self::new(vec![
            Rule {
                fields: NAME_FIELDS,
                keywords: keywords.platform,
                kind: PriceKind::Platform,
            },
            Rule {
                fields: FAMILY_FIELDS,
                keywords: keywords.storage,
                kind: PriceKind::Storage,
            },
            Rule {
                fields: NAME_FIELDS,
                keywords: keywords.gpu,
                kind: PriceKind::Gpu,
            },
            Rule {
                fields: NAME_FIELDS,
                keywords: keywords.memory,
                kind: PriceKind::Memory,
            },
            Rule {
                fields: NAME_FIELDS,
                keywords: keywords.cores,
                kind: PriceKind::Cores,
            },
        ])
    }

    pub fn classify(&self, input: &ClassifyInput) -> PriceKind {
        self.rules
            .iter()
            .find(|r| r.matches(input))
            .map(|r| r.kind)
            .unwrap_or(PriceKind::Compute)
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self::with_keywords(&KeywordSet::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(service: &str, product: &str, meter: &str) -> PriceKind {
        ClassificationRules::default().classify(&ClassifyInput::new(service, product, meter))
    }

    #[test]
    fn platform_beats_storage() {
        assert_eq!(
            classify("Storage", "Windows Server Disk", "P10"),
            PriceKind::Platform
        );
    }

    #[test]
    fn storage_beats_resource_type() {
        assert_eq!(classify("Storage", "Premium SSD", "vCPU"), PriceKind::Storage);
    }

    #[test]
    fn resource_type_markers() {
        assert_eq!(classify("Virtual Machines", "", "E4 Memory"), PriceKind::Memory);
        assert_eq!(classify("Virtual Machines", "", "8 vCore"), PriceKind::Cores);
        assert_eq!(classify("Virtual Machines", "NC Series", "NC6 GPU"), PriceKind::Gpu);
    }

    #[test]
    fn default_is_compute() {
        assert_eq!(classify("Bandwidth", "Rtn Preference", "Egress"), PriceKind::Compute);
        assert_eq!(classify("", "", ""), PriceKind::Compute);
    }

    /// Independent reading of the precedence order over the default keywords.
    fn expected(service: &str, product: &str, meter: &str) -> PriceKind {
        let kw = KeywordSet::default();
        let name = format!("{product} {meter}").to_lowercase();
        let family = format!("{service} {product}").to_lowercase();
        let hit = |text: &str, words: &[&str]| words.iter().any(|w| text.contains(w));
        if hit(&name, kw.platform) {
            PriceKind::Platform
        } else if hit(&family, kw.storage) {
            PriceKind::Storage
        } else if hit(&name, kw.gpu) {
            PriceKind::Gpu
        } else if hit(&name, kw.memory) {
            PriceKind::Memory
        } else if hit(&name, kw.cores) {
            PriceKind::Cores
        } else {
            PriceKind::Compute
        }
    }

    #[test]
    fn every_combination_gets_exactly_one_kind() {
        let services = ["", "Storage", "Virtual Machines", "Bandwidth", "Compute Engine", "SQL Database"];
        let products = ["", "Windows Server", "Premium SSD", "NC Series", "Blob", "D Series Linux"];
        let meters = ["", "D2 v3", "E4 Memory", "8 vCore", "K80 GPU", "RAM", "P10 Disks", "Egress"];
        let rules = ClassificationRules::default();
        let mut seen = std::collections::HashSet::new();
        for service in services {
            for product in products {
                for meter in meters {
                    for (s, p, m) in [
                        (service.to_string(), product.to_string(), meter.to_string()),
                        (service.to_uppercase(), product.to_uppercase(), meter.to_uppercase()),
                    ] {
                        let kind = rules.classify(&ClassifyInput::new(&s, &p, &m));
                        assert_eq!(kind, expected(&s, &p, &m), "{s:?} / {p:?} / {m:?}");
                        seen.insert(kind);
                    }
                }
            }
        }
        // the grid reaches every kind
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn empty_table_still_classifies() {
        let rules = ClassificationRules::new(Vec::new());
        assert_eq!(
            rules.classify(&ClassifyInput::new("Storage", "Disk", "")),
            PriceKind::Compute
        );
    }
}

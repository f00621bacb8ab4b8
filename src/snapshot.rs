//! Pretty JSON snapshot files of a run: raw catalog items, price payloads and
//! bundle payloads, one set per provider.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

use crate::destination::payload::{bundle_payload, price_payload};
use crate::model::{Bundle, Provider, RawCatalogItem, ReconciledRecord};

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    stamp: String,
}

impl SnapshotWriter {
    /// All files of one writer share the timestamp suffix.
    pub fn new(dir: impl Into<PathBuf>, now: DateTime<Local>) -> Self {
        Self {
            dir: dir.into(),
            stamp: now.format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    pub fn path_for(&self, provider: Provider, kind: &str) -> PathBuf {
        self.dir.join(format!("{provider}_{kind}_{}.json", self.stamp))
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create snapshot dir {}", self.dir.display()))?;
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, value)
            .with_context(|| format!("write {}", path.display()))?;
        out.flush()?;
        Ok(path.to_path_buf())
    }

    pub fn write_raw(&self, provider: Provider, items: &[RawCatalogItem]) -> Result<PathBuf> {
        self.write_json(&self.path_for(provider, "raw_data"), items)
    }

    /// Price payloads as they were (or would be) sent, with the id they got.
    pub fn write_prices(
        &self,
        provider: Provider,
        records: &[ReconciledRecord],
        prefix: &str,
    ) -> Result<PathBuf> {
        let payloads: Vec<Value> = records
            .iter()
            .map(|r| {
                let mut body = price_payload(&r.record, prefix);
                if let Some(obj) = body.as_object_mut() {
                    obj.insert("priceId".to_string(), serde_json::json!(r.destination_id));
                    obj.insert("outcome".to_string(), serde_json::json!(r.outcome));
                }
                body
            })
            .collect();
        self.write_json(&self.path_for(provider, "prices"), &payloads)
    }

    pub fn write_bundles(&self, provider: Provider, bundles: &[Bundle]) -> Result<PathBuf> {
        let payloads: Vec<Value> = bundles.iter().map(bundle_payload).collect();
        self.write_json(&self.path_for(provider, "price_sets"), &payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn files_are_named_by_provider_kind_and_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let writer = SnapshotWriter::new(dir.path(), now);

        let items = vec![RawCatalogItem::new(json!({"meterId": "m1"}))];
        let path = writer.write_raw(Provider::Azure, &items).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "azure_raw_data_20240309_140507.json"
        );
        let back: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, json!([{"meterId": "m1"}]));
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out").join("today");
        let writer = SnapshotWriter::new(&nested, Local::now());
        let path = writer.write_bundles(Provider::Gcp, &[]).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }
}

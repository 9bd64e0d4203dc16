//! Result Collector.
//!
//! Ported from `original_source/scraper_backend/scrapers/result_collector.py`'s
//! `ResultCollector`. The Python fallback does a whole-file read-modify-write on every
//! `add_result`; this version instead appends one JSON object per line to a session file
//! (Open Question 2 in DESIGN.md), matching the specification's explicit JSON-lines wording
//! and avoiding the read-modify-write race the Python version has under concurrent workers.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::record::ProductRecord;

#[derive(Debug, Serialize)]
struct PersistedResult<'a> {
    sku: &'a str,
    site: &'a str,
    timestamp: String,
    record: &'a ProductRecord,
}

struct MemoryEntry {
    record: ProductRecord,
    timestamp: String,
}

/// Collects per-(site, SKU) scrape outputs, normalizes them, and persists a session file.
///
/// `test_mode` mirrors the Python collector's in-memory-only mode: results are kept for stats
/// but never written to disk.
pub struct ResultCollector {
    session_id: String,
    output_dir: PathBuf,
    test_mode: bool,
    results: Mutex<HashMap<String, HashMap<String, MemoryEntry>>>,
    session_file: Mutex<Option<std::fs::File>>,
}

impl ResultCollector {
    pub fn new(output_dir: impl Into<PathBuf>, test_mode: bool) -> std::io::Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        let session_id = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        Ok(Self {
            session_id,
            output_dir,
            test_mode,
            results: Mutex::new(HashMap::new()),
            session_file: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_path(&self) -> PathBuf {
        self.output_dir.join(format!("session_{}.jsonl", self.session_id))
    }

    /// Add a scrape result. Never returns an error: I/O and serialization failures are logged
    /// and the collector continues, per the specification's "never throws from add" contract.
    pub fn add(&self, sku: &str, site: &str, mut record: ProductRecord, image_quality: u8) {
        record.sku = sku.to_string();
        record.image_quality = image_quality;
        record.filter_images();

        if !record.has_data() {
            debug!(sku, site, "no data found, skipping");
            return;
        }

        let timestamp = Utc::now().to_rfc3339();

        {
            let mut results = self.results.lock().expect("result collector mutex poisoned");
            results
                .entry(site.to_string())
                .or_default()
                .insert(sku.to_string(), MemoryEntry { record: record.clone(), timestamp: timestamp.clone() });
        }

        if self.test_mode {
            return;
        }

        self.append_to_session_file(sku, site, &record, &timestamp);
    }

    fn append_to_session_file(&self, sku: &str, site: &str, record: &ProductRecord, timestamp: &str) {
        let entry = PersistedResult {
            sku,
            site,
            timestamp: timestamp.to_string(),
            record,
        };

        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, sku, site, "failed to serialize result, skipping persistence");
                return;
            }
        };

        let mut guard = self.session_file.lock().expect("session file mutex poisoned");
        if guard.is_none() {
            match std::fs::OpenOptions::new().create(true).append(true).open(self.session_path()) {
                Ok(file) => *guard = Some(file),
                Err(err) => {
                    warn!(error = %err, path = %self.session_path().display(), "could not open session file, result kept in memory only");
                    return;
                }
            }
        }

        if let Some(file) = guard.as_mut() {
            if let Err(err) = writeln!(file, "{line}") {
                warn!(error = %err, "session file write failed, result kept in memory only");
            }
        }
    }

    /// Returns the session file path if one was written, per spec's `save_session → location`.
    pub fn save_session(&self) -> String {
        if self.test_mode {
            info!("test mode: skipping session save to disk");
            return "TEST_MODE_NO_SAVE".to_string();
        }
        let path = self.session_path();
        if path.exists() {
            path.display().to_string()
        } else {
            String::new()
        }
    }

    pub fn get(&self, sku: &str) -> HashMap<String, ProductRecord> {
        let results = self.results.lock().expect("result collector mutex poisoned");
        results
            .iter()
            .filter_map(|(site, by_sku)| by_sku.get(sku).map(|entry| (site.clone(), entry.record.clone())))
            .collect()
    }

    pub fn stats(&self) -> CollectorStats {
        let results = self.results.lock().expect("result collector mutex poisoned");
        let total_results: usize = results.values().map(|m| m.len()).sum();
        let mut sku_counts: HashMap<&str, usize> = HashMap::new();
        for by_sku in results.values() {
            for sku in by_sku.keys() {
                *sku_counts.entry(sku.as_str()).or_insert(0) += 1;
            }
        }
        CollectorStats {
            total_unique_skus: sku_counts.len(),
            total_results,
            sites_used: results.keys().cloned().collect(),
            skus_found_on_multiple_sites: sku_counts.values().filter(|&&c| c > 1).count(),
            session_id: self.session_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorStats {
    pub total_unique_skus: usize,
    pub total_results: usize,
    pub sites_used: Vec<String>,
    pub skus_found_on_multiple_sites: usize,
    pub session_id: String,
}

/// Maps a raw extracted-field dict (as produced by normalization) to a [`ProductRecord`],
/// tolerating the `"Image URLs"`/`"Image_URLs"` aliasing the Python collector accepted.
pub fn record_from_raw(raw: &Value) -> ProductRecord {
    let get_str = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
    let images = raw
        .get("Images")
        .or_else(|| raw.get("Image URLs"))
        .or_else(|| raw.get("Image_URLs"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    ProductRecord {
        sku: String::new(),
        price: get_str("Price"),
        name: get_str("Name"),
        brand: get_str("Brand"),
        weight: get_str("Weight"),
        images,
        description: get_str("Description"),
        category: get_str("Category"),
        product_type: get_str("ProductType"),
        scraped_price: get_str("ScrapedPrice").or_else(|| get_str("Price")),
        image_quality: 50,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_with_data_is_retrievable() {
        let dir = tempdir().unwrap();
        let collector = ResultCollector::new(dir.path(), false).unwrap();
        let record = ProductRecord {
            name: Some("Widget".into()),
            ..Default::default()
        };
        collector.add("sku1", "site-a", record, 80);
        let found = collector.get("sku1");
        assert_eq!(found.len(), 1);
        assert_eq!(found["site-a"].name.as_deref(), Some("Widget"));
    }

    #[test]
    fn add_without_data_is_noop() {
        let dir = tempdir().unwrap();
        let collector = ResultCollector::new(dir.path(), false).unwrap();
        collector.add("sku1", "site-a", ProductRecord::default(), 80);
        assert!(collector.get("sku1").is_empty());
    }

    #[test]
    fn test_mode_never_writes_session_file() {
        let dir = tempdir().unwrap();
        let collector = ResultCollector::new(dir.path(), true).unwrap();
        let record = ProductRecord {
            name: Some("Widget".into()),
            ..Default::default()
        };
        collector.add("sku1", "site-a", record, 80);
        assert_eq!(collector.save_session(), "TEST_MODE_NO_SAVE");
        assert!(!Path::new(&collector.session_path()).exists());
    }

    #[test]
    fn stats_counts_multi_site_skus() {
        let dir = tempdir().unwrap();
        let collector = ResultCollector::new(dir.path(), false).unwrap();
        let record = ProductRecord {
            name: Some("Widget".into()),
            ..Default::default()
        };
        collector.add("sku1", "site-a", record.clone(), 80);
        collector.add("sku1", "site-b", record, 80);
        let stats = collector.stats();
        assert_eq!(stats.total_unique_skus, 1);
        assert_eq!(stats.skus_found_on_multiple_sites, 1);
        assert_eq!(stats.total_results, 2);
    }
}

//! # Phone Reputation Store
//!
//! In-memory mapping from canonical phone keys (local format, e.g.
//! `0712345678`) to reputation records.
//!
//! - Loads from a JSON file (array of records) or falls back to `default_seed()`.
//! - Lookups take a read lock; `upsert` replaces the whole record
//!   (last write wins on the same key). Records are never deleted.
//! - Keys are expected to be canonical already; normalization lives in
//!   [`crate::phone`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::clamp01;

/// Status as stored. "unknown" is not a stored state, it means "no record".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationStatus {
    Validated,
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneRecord {
    /// Canonical key.
    pub phone_number: String,
    pub status: ReputationStatus,
    pub reason: String,
    /// 0.0 = safe, 1.0 = high risk.
    pub risk_score: f32,
    pub last_updated: String,
}

impl PhoneRecord {
    pub fn new(
        phone_number: impl Into<String>,
        status: ReputationStatus,
        reason: impl Into<String>,
        risk_score: f32,
        last_updated: impl Into<String>,
    ) -> Self {
        Self {
            phone_number: phone_number.into(),
            status,
            reason: reason.into(),
            risk_score: clamp01(risk_score),
            last_updated: last_updated.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub validated: usize,
    pub flagged: usize,
}

#[derive(Debug, Default)]
pub struct PhoneReputationStore {
    records: RwLock<HashMap<String, PhoneRecord>>,
}

impl PhoneReputationStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I: IntoIterator<Item = PhoneRecord>>(records: I) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for r in records {
                map.insert(r.phone_number.clone(), r);
            }
        }
        store
    }

    /// Load records from a JSON file.
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<Vec<PhoneRecord>>(&s).map_err(|e| e.to_string()));
        match parsed {
            Ok(records) => {
                let store = Self::from_records(records.into_iter().map(|mut r| {
                    r.risk_score = clamp01(r.risk_score);
                    r
                }));
                info!(path = %path.display(), records = store.len(), "phone reputation store loaded");
                store
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "phone reputation file unusable, using seed data");
                Self::default_seed()
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Option<PhoneRecord> {
        self.records.read().get(key).cloned()
    }

    /// Insert or replace the record stored under `record.phone_number`.
    pub fn upsert(&self, mut record: PhoneRecord) {
        record.risk_score = clamp01(record.risk_score);
        let key = record.phone_number.clone();
        let status = record.status;
        self.records.write().insert(key, record);
        info!(?status, "phone record upserted");
    }

    pub fn stats(&self) -> StoreStats {
        let map = self.records.read();
        let validated = map
            .values()
            .filter(|r| r.status == ReputationStatus::Validated)
            .count();
        StoreStats {
            total: map.len(),
            validated,
            flagged: map.len() - validated,
        }
    }

    /// All records, sorted by key (admin/debugging).
    pub fn records(&self) -> Vec<PhoneRecord> {
        let mut out: Vec<PhoneRecord> = self.records.read().values().cloned().collect();
        out.sort_by(|a, b| a.phone_number.cmp(&b.phone_number));
        out
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Built-in seed with known-good and known-bad senders.
    /// Used when no reputation file is configured.
    pub fn default_seed() -> Self {
        use ReputationStatus::{Flagged, Validated};

        let seed = [
            // Known-good senders
            ("0712345678", Validated, "verified_business", 0.1, "2024-01-01"),
            ("0723456789", Validated, "registered_user", 0.2, "2024-01-02"),
            ("0734567890", Validated, "government_agency", 0.0, "2024-01-03"),
            ("0745678901", Validated, "verified_contact", 0.1, "2024-01-04"),
            ("0756789012", Validated, "trusted_sender", 0.1, "2024-01-05"),
            // Reported / suspicious senders
            ("0789123456", Flagged, "reported_spam", 0.9, "2024-01-10"),
            ("0765432198", Flagged, "high_frequency_sender", 0.7, "2024-01-11"),
            ("0723456780", Flagged, "suspicious_pattern", 0.8, "2024-01-12"),
            ("0712345698", Flagged, "blacklisted", 1.0, "2024-01-13"),
            ("0690123456", Flagged, "fraud_reported", 0.95, "2024-01-14"),
            ("0677841672", Flagged, "spam_campaign", 0.85, "2024-01-15"),
            ("0683146464", Flagged, "mass_sender", 0.75, "2024-01-16"),
            // Spiritual-services senders (mixed)
            ("0683817701", Flagged, "spiritual_services_spam", 0.8, "2024-01-20"),
            ("0629808228", Flagged, "traditional_healer_spam", 0.9, "2024-01-21"),
            ("0788901234", Validated, "legitimate_traditional_healer", 0.3, "2024-01-22"),
            // Fixtures
            ("0700000001", Flagged, "test_spam", 0.9, "2024-01-25"),
            ("0700000002", Validated, "test_legitimate", 0.1, "2024-01-25"),
        ];

        Self::from_records(
            seed.into_iter()
                .map(|(k, st, why, risk, at)| PhoneRecord::new(k, st, why, risk, at)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_counts_add_up() {
        let s = PhoneReputationStore::default_seed().stats();
        assert_eq!(s.total, 17);
        assert_eq!(s.validated, 7);
        assert_eq!(s.flagged, 10);
        assert_eq!(s.validated + s.flagged, s.total);
    }

    #[test]
    fn lookup_hits_and_misses() {
        let store = PhoneReputationStore::default_seed();
        let r = store.lookup("0789123456").expect("seeded record");
        assert_eq!(r.status, ReputationStatus::Flagged);
        assert!((r.risk_score - 0.9).abs() < 1e-6);
        assert!(store.lookup("0999999999").is_none());
    }

    #[test]
    fn upsert_is_last_write_wins() {
        let store = PhoneReputationStore::new();
        store.upsert(PhoneRecord::new("0711111111", ReputationStatus::Validated, "ok", 0.1, "2024-02-01"));
        store.upsert(PhoneRecord::new("0711111111", ReputationStatus::Flagged, "reported", 1.7, "2024-02-02"));

        assert_eq!(store.len(), 1);
        let r = store.lookup("0711111111").unwrap();
        assert_eq!(r.status, ReputationStatus::Flagged);
        assert_eq!(r.reason, "reported");
        assert_eq!(r.risk_score, 1.0, "risk is clamped on write");
    }

    #[test]
    fn missing_file_falls_back_to_seed() {
        let store = PhoneReputationStore::load_from_file("definitely/not/here.json");
        assert_eq!(store.len(), PhoneReputationStore::default_seed().len());
    }

    #[test]
    fn loads_records_from_json_file() {
        let mut path = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!("phone_store_test_{nanos}.json"));
        fs::write(
            &path,
            r#"[{"phone_number":"0700000009","status":"flagged","reason":"fixture","risk_score":0.6,"last_updated":"2024-03-01"}]"#,
        )
        .unwrap();

        let store = PhoneReputationStore::load_from_file(&path);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].reason, "fixture");

        let _ = fs::remove_file(&path);
    }
}

//! Sender validation against the reputation store.
//!
//! `normalize` turns any accepted spelling of a number into the canonical
//! local key (`0` + 9 significant digits for known country codes):
//!
//! ```text
//! +255 712 345 678  -> 0712345678
//! 255-712-345-678   -> 0712345678
//! 712345678         -> 0712345678
//! (071) 234-5678    -> 0712345678
//! ```
//!
//! The function is idempotent: every rewrite produces a 10-digit key starting
//! with `0`, which no rewrite rule matches again.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{GuardError, PhoneError};
use crate::models::{Assessed, PhoneAnalysisResult, PhoneStatus};
use crate::reputation::{PhoneRecord, PhoneReputationStore, ReputationStatus, StoreStats};

/// Risk assigned to numbers the store has never seen.
pub const UNKNOWN_RISK_SCORE: f32 = 0.3;
/// Risk assigned when the number cannot be normalized at all.
pub const DEGRADED_RISK_SCORE: f32 = 0.5;

/// Country prefixes rewritten to local form: (prefix, total digit length).
const COUNTRY_PREFIXES: &[(&str, usize)] = &[("255", 12)];
const LOCAL_SIGNIFICANT_DIGITS: usize = 9;
const MAX_DIGITS: usize = 15;

/// Canonical lookup key for `raw`.
pub fn normalize(raw: &str) -> Result<String, PhoneError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        return Err(PhoneError::NoDigits);
    }
    if digits.len() > MAX_DIGITS {
        return Err(PhoneError::TooLong(digits.len()));
    }

    for (prefix, total) in COUNTRY_PREFIXES {
        if digits.len() == *total && digits.starts_with(prefix) {
            return Ok(format!("0{}", &digits[prefix.len()..]));
        }
    }

    // Bare significant number of a mobile line (6x / 7x).
    if digits.len() == LOCAL_SIGNIFICANT_DIGITS && digits.starts_with(['6', '7']) {
        return Ok(format!("0{digits}"));
    }

    Ok(digits)
}

/// Short, non-reversible id for logs. Raw numbers are never logged.
pub fn anon_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Clone)]
pub struct PhoneValidator {
    store: Arc<PhoneReputationStore>,
}

impl PhoneValidator {
    pub fn new(store: Arc<PhoneReputationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PhoneReputationStore> {
        &self.store
    }

    /// Validate `raw` against the store. Never fails: numbers that cannot be
    /// normalized come back as a degraded `unknown` result.
    pub fn validate(&self, raw: &str) -> Assessed<PhoneAnalysisResult> {
        let key = match normalize(raw) {
            Ok(k) => k,
            Err(e) => {
                let detail = e.to_string();
                let err = GuardError::from(e);
                warn!(id = %anon_hash(raw), error = %err, "phone normalization failed");
                return Assessed::Degraded {
                    value: PhoneAnalysisResult::new(
                        raw,
                        PhoneStatus::Unknown,
                        DEGRADED_RISK_SCORE,
                        format!("validation error: {detail}"),
                    ),
                    reason: err.to_string(),
                };
            }
        };

        let id = anon_hash(&key);
        match self.store.lookup(&key) {
            Some(record) => {
                let status = match record.status {
                    ReputationStatus::Validated => PhoneStatus::Validated,
                    ReputationStatus::Flagged => PhoneStatus::Flagged,
                };
                info!(%id, status = status.as_str(), risk = record.risk_score, "phone found");
                Assessed::Confident(
                    PhoneAnalysisResult::new(raw, status, record.risk_score, record.reason)
                        .updated_at(record.last_updated),
                )
            }
            None => {
                debug!(%id, "phone not found in database");
                Assessed::Confident(PhoneAnalysisResult::new(
                    raw,
                    PhoneStatus::Unknown,
                    UNKNOWN_RISK_SCORE,
                    "not found in database",
                ))
            }
        }
    }

    /// Add or replace the record for `raw` (admin path).
    pub fn add_phone_record(
        &self,
        raw: &str,
        is_validated: bool,
        risk_score: f32,
        reason: Option<&str>,
    ) -> Result<PhoneRecord, PhoneError> {
        let key = normalize(raw)?;
        let status = if is_validated {
            ReputationStatus::Validated
        } else {
            ReputationStatus::Flagged
        };
        let reason = reason.map(str::to_string).unwrap_or_else(|| {
            if is_validated {
                "manually validated".to_string()
            } else {
                "manually flagged".to_string()
            }
        });
        let record = PhoneRecord::new(
            key,
            status,
            reason,
            risk_score,
            Utc::now().format("%Y-%m-%d").to_string(),
        );
        self.store.upsert(record.clone());
        Ok(record)
    }

    pub fn database_stats(&self) -> StoreStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PhoneValidator {
        PhoneValidator::new(Arc::new(PhoneReputationStore::default_seed()))
    }

    #[test]
    fn normalizes_common_spellings() {
        for raw in [
            "+255712345678",
            "+255 712 345 678",
            "255-712-345-678",
            "712345678",
            "0712345678",
            "(071) 234-5678",
        ] {
            assert_eq!(normalize(raw).unwrap(), "0712345678", "input {raw}");
        }
    }

    #[test]
    fn unrelated_formats_keep_their_digits() {
        assert_eq!(normalize("+1 (415) 555-0100").unwrap(), "14155550100");
        assert_eq!(normalize("812345678").unwrap(), "812345678");
        assert_eq!(normalize("25571234567").unwrap(), "25571234567");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "+255712345678",
            "712345678",
            "0712345678",
            "+1 (415) 555-0100",
            "255 255 255 255",
            "612 345 678",
            "0000",
        ] {
            let once = normalize(raw).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "input {raw}");
        }
    }

    #[test]
    fn rejects_unparseable_numbers() {
        assert_eq!(normalize("call me"), Err(PhoneError::NoDigits));
        assert_eq!(normalize("+"), Err(PhoneError::NoDigits));
        assert_eq!(normalize("1234567890123456"), Err(PhoneError::TooLong(16)));
    }

    #[test]
    fn known_number_copies_record() {
        let r = validator().validate("+255 789 123 456");
        assert!(!r.is_degraded());
        let v = r.value();
        assert_eq!(v.status, PhoneStatus::Flagged);
        assert!((v.risk_score - 0.9).abs() < 1e-6);
        assert_eq!(v.reason, "reported_spam");
        assert_eq!(v.phone_number, "+255 789 123 456", "original spelling is kept");
        assert_eq!(v.last_updated.as_deref(), Some("2024-01-10"));
    }

    #[test]
    fn unknown_number_gets_default_risk() {
        let r = validator().validate("0799999999");
        assert!(!r.is_degraded());
        assert_eq!(r.value().status, PhoneStatus::Unknown);
        assert!((r.value().risk_score - UNKNOWN_RISK_SCORE).abs() < 1e-6);
        assert_eq!(r.value().reason, "not found in database");
    }

    #[test]
    fn malformed_number_degrades_instead_of_failing() {
        let r = validator().validate("no digits here");
        assert!(r.is_degraded());
        assert_eq!(r.value().status, PhoneStatus::Unknown);
        assert!((r.value().risk_score - DEGRADED_RISK_SCORE).abs() < 1e-6);
        assert!(r.value().reason.starts_with("validation error"));
    }

    #[test]
    fn added_record_is_found_under_any_spelling() {
        let v = validator();
        let rec = v
            .add_phone_record("+255 711 000 111", false, 0.8, None)
            .unwrap();
        assert_eq!(rec.phone_number, "0711000111");
        assert_eq!(rec.reason, "manually flagged");

        let r = v.validate("711000111");
        assert_eq!(r.value().status, PhoneStatus::Flagged);
        assert!(v.add_phone_record("n/a", true, 0.1, None).is_err());
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("0712345678");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("0712345678"));
        assert_ne!(a, anon_hash("0712345679"));
    }
}

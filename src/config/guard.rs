// src/config/guard.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};
use tracing::{info, warn};

use crate::delivery::DEFAULT_SUCCESS_RATE;
use crate::engine::{DEFAULT_HIGH_RISK_THRESHOLD, DEFAULT_SPAM_CONFIDENCE_THRESHOLD};

pub const ENV_CONFIG_PATH: &str = "GUARD_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/guard.toml";

pub const DEFAULT_MAX_TEXT_LENGTH: usize = 1000;
pub const DEFAULT_MODEL_PATH: &str = "models/spam_nb.json";

fn default_spam_threshold() -> f32 {
    DEFAULT_SPAM_CONFIDENCE_THRESHOLD
}
fn default_risk_threshold() -> f32 {
    DEFAULT_HIGH_RISK_THRESHOLD
}
fn default_max_text_length() -> usize {
    DEFAULT_MAX_TEXT_LENGTH
}
fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_PATH)
}
fn default_success_rate() -> f64 {
    DEFAULT_SUCCESS_RATE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_spam_threshold")]
    pub spam_confidence_threshold: f32,
    #[serde(default = "default_risk_threshold")]
    pub high_risk_threshold: f32,
    #[serde(default)]
    pub strict_mode: bool,
    /// Characters; longer texts are truncated before scoring.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    /// JSON array of phone records. `None` = built-in seed.
    #[serde(default)]
    pub phone_db_path: Option<PathBuf>,
    #[serde(default = "default_success_rate")]
    pub delivery_success_rate: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            spam_confidence_threshold: default_spam_threshold(),
            high_risk_threshold: default_risk_threshold(),
            strict_mode: false,
            max_text_length: default_max_text_length(),
            model_path: default_model_path(),
            phone_db_path: None,
            delivery_success_rate: default_success_rate(),
        }
    }
}

impl GuardConfig {
    /// File (if present) + env overrides + sanitize.
    /// A missing file is fine; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            info!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        let cfg: GuardConfig = toml::from_str(&data)?;
        info!(path = %path.as_ref().display(), "config file loaded");
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|k| env::var(k).ok());
    }

    /// Apply `GUARD_*` overrides from any key/value source. Unparseable values
    /// are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring unparseable config override");
                    None
                }
            }
        }

        if let Some(v) = parse("GUARD_SPAM_THRESHOLD", get("GUARD_SPAM_THRESHOLD")) {
            self.spam_confidence_threshold = v;
        }
        if let Some(v) = parse("GUARD_RISK_THRESHOLD", get("GUARD_RISK_THRESHOLD")) {
            self.high_risk_threshold = v;
        }
        if let Some(raw) = get("GUARD_STRICT_MODE") {
            self.strict_mode = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(v) = parse("GUARD_MAX_TEXT_LENGTH", get("GUARD_MAX_TEXT_LENGTH")) {
            self.max_text_length = v;
        }
        if let Some(p) = get("GUARD_MODEL_PATH").filter(|s| !s.trim().is_empty()) {
            self.model_path = PathBuf::from(p);
        }
        if let Some(p) = get("GUARD_PHONE_DB_PATH").filter(|s| !s.trim().is_empty()) {
            self.phone_db_path = Some(PathBuf::from(p));
        }
        if let Some(v) = parse("GUARD_DELIVERY_SUCCESS_RATE", get("GUARD_DELIVERY_SUCCESS_RATE")) {
            self.delivery_success_rate = v;
        }
    }

    /// Replace out-of-range values with defaults.
    pub fn sanitize(&mut self) {
        fn unit_f32(name: &str, v: &mut f32, default: f32) {
            if !v.is_finite() || !(0.0..=1.0).contains(v) {
                warn!(field = name, value = *v, default, "out of range, using default");
                *v = default;
            }
        }

        unit_f32(
            "spam_confidence_threshold",
            &mut self.spam_confidence_threshold,
            default_spam_threshold(),
        );
        unit_f32(
            "high_risk_threshold",
            &mut self.high_risk_threshold,
            default_risk_threshold(),
        );
        if !self.delivery_success_rate.is_finite()
            || !(0.0..=1.0).contains(&self.delivery_success_rate)
        {
            warn!(
                value = self.delivery_success_rate,
                "delivery_success_rate out of range, using default"
            );
            self.delivery_success_rate = default_success_rate();
        }
        if self.max_text_length == 0 {
            warn!("max_text_length is 0, using default");
            self.max_text_length = default_max_text_length();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> GuardConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut cfg = GuardConfig::default();
        cfg.apply_overrides(|k| map.get(k).cloned());
        cfg.sanitize();
        cfg
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = GuardConfig::default();
        assert!((c.spam_confidence_threshold - 0.5).abs() < 1e-6);
        assert!((c.high_risk_threshold - 0.7).abs() < 1e-6);
        assert!(!c.strict_mode);
        assert_eq!(c.max_text_length, 1000);
        assert_eq!(c.model_path, PathBuf::from("models/spam_nb.json"));
        assert!(c.phone_db_path.is_none());
    }

    #[test]
    fn env_style_overrides_apply() {
        let c = overrides(&[
            ("GUARD_SPAM_THRESHOLD", "0.6"),
            ("GUARD_STRICT_MODE", "true"),
            ("GUARD_MAX_TEXT_LENGTH", "160"),
            ("GUARD_PHONE_DB_PATH", "data/phones.json"),
        ]);
        assert!((c.spam_confidence_threshold - 0.6).abs() < 1e-6);
        assert!(c.strict_mode);
        assert_eq!(c.max_text_length, 160);
        assert_eq!(c.phone_db_path, Some(PathBuf::from("data/phones.json")));
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let c = overrides(&[
            ("GUARD_SPAM_THRESHOLD", "1.5"),
            ("GUARD_RISK_THRESHOLD", "abc"),
            ("GUARD_MAX_TEXT_LENGTH", "0"),
            ("GUARD_DELIVERY_SUCCESS_RATE", "NaN"),
        ]);
        assert!((c.spam_confidence_threshold - 0.5).abs() < 1e-6);
        assert!((c.high_risk_threshold - 0.7).abs() < 1e-6);
        assert_eq!(c.max_text_length, 1000);
        assert!((c.delivery_success_rate - 0.98).abs() < 1e-9);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let c: GuardConfig = toml::from_str("strict_mode = true\nhigh_risk_threshold = 0.8\n").unwrap();
        assert!(c.strict_mode);
        assert!((c.high_risk_threshold - 0.8).abs() < 1e-6);
        assert_eq!(c.max_text_length, 1000);
    }
}

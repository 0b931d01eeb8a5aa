//! Shared data model of the screening pipeline.
//!
//! Per-request results are plain owned structs: each request builds its own,
//! nothing here is shared or mutated after construction.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final disposition of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Clean,
    ContentWarning,
    SenderWarning,
    Blocked,
}

impl Decision {
    pub const ALL: [Decision; 4] = [
        Decision::Clean,
        Decision::ContentWarning,
        Decision::SenderWarning,
        Decision::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Clean => "CLEAN",
            Decision::ContentWarning => "CONTENT_WARNING",
            Decision::SenderWarning => "SENDER_WARNING",
            Decision::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let up = s.trim().to_ascii_uppercase().replace('-', "_");
        Decision::ALL
            .into_iter()
            .find(|d| d.as_str() == up)
            .ok_or_else(|| format!("unknown decision '{s}'"))
    }
}

/// Label produced by the text classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Ham,
    Spam,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Ham => "ham",
            Classification::Spam => "spam",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reputation of the sender as seen by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneStatus {
    Validated,
    Flagged,
    Unknown,
}

impl PhoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhoneStatus::Validated => "validated",
            PhoneStatus::Flagged => "flagged",
            PhoneStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Blocked,
    Failed,
    Pending,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Blocked => "blocked",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysisResult {
    pub classification: Classification,
    /// Probability of `classification`, in <0.0, 1.0>.
    pub confidence: f32,
    pub processing_time_ms: f64,
    pub model_version: String,
}

impl TextAnalysisResult {
    pub fn new(
        classification: Classification,
        confidence: f32,
        processing_time_ms: f64,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            classification,
            confidence: clamp01(confidence),
            processing_time_ms,
            model_version: model_version.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneAnalysisResult {
    /// The number exactly as the caller supplied it.
    pub phone_number: String,
    pub status: PhoneStatus,
    pub risk_score: f32,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl PhoneAnalysisResult {
    pub fn new(
        phone_number: impl Into<String>,
        status: PhoneStatus,
        risk_score: f32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            phone_number: phone_number.into(),
            status,
            risk_score: clamp01(risk_score),
            reason: reason.into(),
            last_updated: None,
        }
    }

    pub fn updated_at(mut self, date: impl Into<String>) -> Self {
        self.last_updated = Some(date.into());
        self
    }
}

/// Output of the decision engine for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedAnalysisResult {
    pub text_analysis: TextAnalysisResult,
    pub phone_analysis: PhoneAnalysisResult,
    pub decision: Decision,
    pub decision_reasoning: String,
    pub confidence_score: f32,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeliveryResult {
    pub delivery_id: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub delivery_time: DateTime<Utc>,
}

/// Unified response handed back to the caller of `analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub message_id: String,
    pub decision: Decision,
    pub confidence: f32,
    pub text_classification: Classification,
    pub text_confidence: f32,
    pub phone_status: PhoneStatus,
    pub phone_risk_score: f32,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_result: Option<MessageDeliveryResult>,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// A component result that is either trustworthy or a conservative stand-in.
///
/// Both arms carry the same payload shape so downstream rules can run either
/// way, but callers that care (logging, metrics, tests) can tell them apart.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessed<T> {
    Confident(T),
    Degraded { value: T, reason: String },
}

impl<T> Assessed<T> {
    pub fn value(&self) -> &T {
        match self {
            Assessed::Confident(v) => v,
            Assessed::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Assessed::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Assessed::Confident(_) => None,
            Assessed::Degraded { reason, .. } => Some(reason.as_str()),
        }
    }
}

/// Clamp to [0.0, 1.0]. NaN is passed through so the decision engine can reject it.
pub(crate) fn clamp01(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}

//! # Decision Engine
//! Pure, testable logic that maps `(text result, phone result, thresholds)` →
//! `CombinedAnalysisResult`. No I/O.
//!
//! Policy: a fixed rule table evaluated top to bottom, first match wins. The
//! order *is* the tie-break; do not reorder. Confidence depends only on the
//! text confidence, the phone risk and the chosen outcome.
//!
//! The only mutable state is the threshold pair (plus strict mode), guarded by
//! a lock and read as one snapshot per decision.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GuardError;
use crate::models::{
    clamp01, Classification, CombinedAnalysisResult, Decision, PhoneAnalysisResult, PhoneStatus,
    TextAnalysisResult,
};

pub const DEFAULT_SPAM_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_HIGH_RISK_THRESHOLD: f32 = 0.7;

/// Fixed bounds of the "moderate" bands (not tunable).
const MODERATE_SPAM_MIN: f32 = 0.3;
const MODERATE_RISK_MIN: f32 = 0.4;
const LOW_RISK_MAX: f32 = 0.3;

/// Strict mode lowers both thresholds by this much, down to the floors below.
const STRICT_DELTA: f32 = 0.2;
const STRICT_SPAM_FLOOR: f32 = 0.3;
const STRICT_RISK_FLOOR: f32 = 0.5;

/// Budget added to the text timing for the phone lookup step.
const PHONE_LOOKUP_OVERHEAD_MS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub spam_confidence_threshold: f32,
    pub high_risk_threshold: f32,
    #[serde(default)]
    pub strict_mode: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            spam_confidence_threshold: DEFAULT_SPAM_CONFIDENCE_THRESHOLD,
            high_risk_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
            strict_mode: false,
        }
    }
}

impl Thresholds {
    /// `(spam, risk)` actually applied by the rule table.
    pub fn effective(&self) -> (f32, f32) {
        if self.strict_mode {
            (
                (self.spam_confidence_threshold - STRICT_DELTA).max(STRICT_SPAM_FLOOR),
                (self.high_risk_threshold - STRICT_DELTA).max(STRICT_RISK_FLOOR),
            )
        } else {
            (self.spam_confidence_threshold, self.high_risk_threshold)
        }
    }
}

/// Derived booleans, computed once in a fixed order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub is_spam: bool,
    pub spam_confidence: f32,
    pub high_spam: bool,
    pub moderate_spam: bool,
    pub high_phone_risk: bool,
    pub moderate_phone_risk: bool,
    pub risk_score: f32,
    pub status: PhoneStatus,
}

impl Signals {
    pub fn derive(
        classification: Classification,
        confidence: f32,
        status: PhoneStatus,
        risk_score: f32,
        thresholds: &Thresholds,
    ) -> Self {
        let (spam_threshold, risk_threshold) = thresholds.effective();

        let is_spam = classification == Classification::Spam;
        let spam_confidence = if is_spam { confidence } else { 1.0 - confidence };
        let high_spam = is_spam && spam_confidence >= spam_threshold;
        let moderate_spam = is_spam && spam_confidence >= MODERATE_SPAM_MIN;
        let high_phone_risk = risk_score >= risk_threshold;
        let moderate_phone_risk = risk_score >= MODERATE_RISK_MIN;

        Self {
            is_spam,
            spam_confidence,
            high_spam,
            moderate_spam,
            high_phone_risk,
            moderate_phone_risk,
            risk_score,
            status,
        }
    }
}

/// The rule table. Returns the outcome and an audit string carrying the numbers
/// that triggered it.
pub fn apply_rules(s: &Signals) -> (Decision, String) {
    let flagged = s.status == PhoneStatus::Flagged;

    if flagged && (s.high_spam || s.moderate_spam) {
        (
            Decision::Blocked,
            format!(
                "Flagged phone ({:.2}) + spam content ({:.2})",
                s.risk_score, s.spam_confidence
            ),
        )
    } else if flagged {
        (
            Decision::SenderWarning,
            format!("Flagged phone ({:.2}) with non-spam content", s.risk_score),
        )
    } else if s.high_spam && s.high_phone_risk {
        (
            Decision::Blocked,
            format!(
                "High spam confidence ({:.2}) + high phone risk ({:.2})",
                s.spam_confidence, s.risk_score
            ),
        )
    } else if s.high_spam && s.moderate_phone_risk {
        (
            Decision::SenderWarning,
            format!(
                "High spam confidence ({:.2}) + moderate phone risk ({:.2})",
                s.spam_confidence, s.risk_score
            ),
        )
    } else if s.moderate_spam && s.status == PhoneStatus::Unknown {
        (
            Decision::ContentWarning,
            format!(
                "Moderate spam confidence ({:.2}) + unknown phone",
                s.spam_confidence
            ),
        )
    } else if s.moderate_spam && s.status == PhoneStatus::Validated {
        (
            Decision::ContentWarning,
            format!(
                "Moderate spam confidence ({:.2}) + validated phone",
                s.spam_confidence
            ),
        )
    } else if s.high_phone_risk && !s.high_spam {
        (
            Decision::SenderWarning,
            format!(
                "High phone risk ({:.2}) + low spam confidence ({:.2})",
                s.risk_score, s.spam_confidence
            ),
        )
    } else if s.status == PhoneStatus::Validated && !s.moderate_spam {
        (
            Decision::Clean,
            format!(
                "Validated phone + non-spam content ({:.2})",
                s.spam_confidence
            ),
        )
    } else if !s.moderate_spam && s.risk_score < LOW_RISK_MAX {
        // Strict `<`: a risk of exactly 0.30 falls through to the default below.
        (
            Decision::Clean,
            format!(
                "Low spam confidence ({:.2}) + low phone risk ({:.2})",
                s.spam_confidence, s.risk_score
            ),
        )
    } else {
        (
            Decision::ContentWarning,
            format!(
                "Moderate risk: spam={:.2}, phone_risk={:.2}",
                s.spam_confidence, s.risk_score
            ),
        )
    }
}

/// Confidence of the final outcome.
pub fn combined_confidence(text_confidence: f32, risk_score: f32, decision: Decision) -> f32 {
    let c = match decision {
        Decision::Blocked => text_confidence.max(1.0 - risk_score).min(0.95),
        Decision::Clean => (text_confidence * (1.0 - risk_score)).min(0.9),
        Decision::ContentWarning | Decision::SenderWarning => 0.6 + text_confidence * 0.3,
    };
    clamp01(c)
}

/// Same logic as [`DecisionEngine::decide`] but with explicit thresholds.
/// Rejects non-finite scores; everything else is total.
pub fn decide_with(
    text: &TextAnalysisResult,
    phone: &PhoneAnalysisResult,
    thresholds: &Thresholds,
) -> Result<CombinedAnalysisResult, GuardError> {
    if !text.confidence.is_finite() {
        return Err(GuardError::NonFiniteScore {
            field: "text confidence",
            value: text.confidence,
        });
    }
    if !phone.risk_score.is_finite() {
        return Err(GuardError::NonFiniteScore {
            field: "phone risk score",
            value: phone.risk_score,
        });
    }

    let text_confidence = clamp01(text.confidence);
    let risk_score = clamp01(phone.risk_score);

    let signals = Signals::derive(
        text.classification,
        text_confidence,
        phone.status,
        risk_score,
        thresholds,
    );
    let (decision, reasoning) = apply_rules(&signals);
    let confidence_score = combined_confidence(text_confidence, risk_score, decision);

    Ok(CombinedAnalysisResult {
        text_analysis: text.clone(),
        phone_analysis: phone.clone(),
        decision,
        decision_reasoning: reasoning,
        confidence_score,
        processing_time_ms: text.processing_time_ms + PHONE_LOOKUP_OVERHEAD_MS,
    })
}

/// Holds the tunable thresholds; decisions themselves are stateless.
#[derive(Debug, Default)]
pub struct DecisionEngine {
    thresholds: RwLock<Thresholds>,
}

impl DecisionEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds: RwLock::new(thresholds),
        }
    }

    pub fn decide(
        &self,
        text: &TextAnalysisResult,
        phone: &PhoneAnalysisResult,
    ) -> Result<CombinedAnalysisResult, GuardError> {
        let snapshot = *self.thresholds.read();
        let out = decide_with(text, phone, &snapshot)?;
        info!(
            decision = out.decision.as_str(),
            confidence = out.confidence_score,
            reasoning = %out.decision_reasoning,
            "decision made"
        );
        Ok(out)
    }

    /// Partial update. Every supplied threshold must lie in <0.0, 1.0>; if any
    /// does not, nothing changes and `false` is returned. All supplied values
    /// land under one write guard.
    pub fn update(&self, spam: Option<f32>, risk: Option<f32>, strict: Option<bool>) -> bool {
        let valid = |v: Option<f32>| v.is_none_or(|x| (0.0..=1.0).contains(&x));
        if !valid(spam) || !valid(risk) {
            warn!(?spam, ?risk, ?strict, "threshold update rejected");
            return false;
        }
        if spam.is_none() && risk.is_none() && strict.is_none() {
            return true;
        }

        let mut t = self.thresholds.write();
        if let Some(s) = spam {
            t.spam_confidence_threshold = s;
        }
        if let Some(r) = risk {
            t.high_risk_threshold = r;
        }
        if let Some(on) = strict {
            t.strict_mode = on;
        }
        info!(
            spam = t.spam_confidence_threshold,
            risk = t.high_risk_threshold,
            strict_mode = t.strict_mode,
            "thresholds updated"
        );
        true
    }

    pub fn update_thresholds(&self, spam: Option<f32>, risk: Option<f32>) -> bool {
        self.update(spam, risk, None)
    }

    pub fn current_thresholds(&self) -> Thresholds {
        *self.thresholds.read()
    }
}

//! # Analysis Orchestrator
//! Sequences one screening request and owns every shared component.
//!
//! Pipeline per request:
//! 1. allocate a message id,
//! 2. classify text and validate the sender (concurrently, on the blocking pool),
//! 3. decide,
//! 4. deliver when a receiver is given (failures here never abort the request),
//! 5. count the outcome and build the response.
//!
//! Any error in steps 2–3, including a panic inside a step, produces the
//! fail-closed BLOCKED fallback. `analyze` itself cannot fail.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::classifier::{load_classifier, DynClassifier, ModelInfo, TextAnalyzer};
use crate::config::GuardConfig;
use crate::delivery::{DeliveryCoordinator, DeliveryStats, SimulatedGateway, SmsGateway};
use crate::engine::{DecisionEngine, Thresholds};
use crate::error::GuardError;
use crate::models::{
    AnalysisResponse, Classification, CombinedAnalysisResult, Decision, MessageDeliveryResult,
    PhoneStatus,
};
use crate::phone::{anon_hash, PhoneValidator};
use crate::reputation::{PhoneRecord, PhoneReputationStore, StoreStats};
use crate::stats::RunningStatistics;

const FALLBACK_SCORE: f32 = 0.5;

const FLAGGED_TRAINING_RISK: f32 = 0.8;
const VALIDATED_TRAINING_RISK: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub phone_added: bool,
    /// Always true: the example is logged, the text model is not retrained.
    pub text_logged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub total_requests: u64,
    pub decisions_by_outcome: BTreeMap<Decision, u64>,
    pub phone_database_stats: StoreStats,
    pub model_info: ModelInfo,
    pub uptime_seconds: f64,
    pub decision_thresholds: Thresholds,
    pub delivery_stats: DeliveryStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub text_classification: bool,
    pub phone_validation: bool,
    pub decision_engine: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// "healthy" when every component is up, otherwise "degraded".
    pub status: &'static str,
    pub models_loaded: bool,
    pub database_connected: bool,
    pub components: ComponentHealth,
    pub total_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhoneDatabaseInfo {
    pub database_stats: StoreStats,
    pub connected: bool,
    pub status: &'static str,
    pub records: Vec<PhoneRecord>,
}

pub struct AnalysisService {
    analyzer: TextAnalyzer,
    validator: PhoneValidator,
    engine: DecisionEngine,
    delivery: Arc<DeliveryCoordinator>,
    stats: RunningStatistics,
}

impl AnalysisService {
    pub fn new(
        classifier: DynClassifier,
        store: Arc<PhoneReputationStore>,
        gateway: Arc<dyn SmsGateway>,
        thresholds: Thresholds,
        max_text_length: usize,
    ) -> Self {
        Self {
            analyzer: TextAnalyzer::new(classifier, max_text_length),
            validator: PhoneValidator::new(store),
            engine: DecisionEngine::new(thresholds),
            delivery: Arc::new(DeliveryCoordinator::new(gateway)),
            stats: RunningStatistics::new(),
        }
    }

    /// Build every component from configuration. Missing model or phone files
    /// degrade (unavailable classifier, seeded store); they never abort startup.
    pub fn from_config(cfg: &GuardConfig) -> Self {
        let classifier = load_classifier(&cfg.model_path);
        let store = match &cfg.phone_db_path {
            Some(p) => PhoneReputationStore::load_from_file(p),
            None => PhoneReputationStore::default_seed(),
        };
        let thresholds = Thresholds {
            spam_confidence_threshold: cfg.spam_confidence_threshold,
            high_risk_threshold: cfg.high_risk_threshold,
            strict_mode: cfg.strict_mode,
        };
        let svc = Self::new(
            classifier,
            Arc::new(store),
            Arc::new(SimulatedGateway::new(cfg.delivery_success_rate)),
            thresholds,
            cfg.max_text_length,
        );
        info!(
            model_loaded = svc.analyzer.is_model_loaded(),
            phones = svc.validator.store().len(),
            strict_mode = cfg.strict_mode,
            "analysis service ready"
        );
        svc
    }

    /// Screen one message. Always returns a response.
    pub async fn analyze(
        &self,
        text: &str,
        sender: &str,
        receiver: Option<&str>,
    ) -> AnalysisResponse {
        let started = Instant::now();
        let message_id = new_message_id();
        info!(%message_id, sender = %anon_hash(sender), len = text.chars().count(), "analysis started");

        let combined = match self.screen(&message_id, text, sender).await {
            Ok(c) => c,
            Err(e) => return self.fallback(message_id, started, e),
        };

        let delivery_result = match receiver {
            Some(to) => self.deliver(&message_id, to, text, combined.decision, sender).await,
            None => None,
        };

        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.record(combined.decision);
        counter!("guard_analyses_total", "decision" => combined.decision.as_str()).increment(1);
        histogram!("guard_analysis_ms").record(processing_time_ms);

        info!(
            %message_id,
            decision = combined.decision.as_str(),
            confidence = combined.confidence_score,
            elapsed_ms = processing_time_ms,
            "analysis complete"
        );

        AnalysisResponse {
            message_id,
            decision: combined.decision,
            confidence: combined.confidence_score,
            text_classification: combined.text_analysis.classification,
            text_confidence: combined.text_analysis.confidence,
            phone_status: combined.phone_analysis.status,
            phone_risk_score: combined.phone_analysis.risk_score,
            reasoning: combined.decision_reasoning,
            delivery_result,
            processing_time_ms,
            timestamp: Utc::now(),
        }
    }

    /// Steps 2–3. Classification and lookup are independent, so they run side
    /// by side; a panic in either surfaces as a `JoinError`.
    async fn screen(
        &self,
        message_id: &str,
        text: &str,
        sender: &str,
    ) -> Result<CombinedAnalysisResult, GuardError> {
        let analyzer = self.analyzer.clone();
        let owned_text = text.to_string();
        let validator = self.validator.clone();
        let owned_sender = sender.to_string();

        debug!(%message_id, "classifying text and validating sender");
        let (text_res, phone_res) = tokio::join!(
            tokio::task::spawn_blocking(move || analyzer.classify(&owned_text)),
            tokio::task::spawn_blocking(move || validator.validate(&owned_sender)),
        );
        let text_res = text_res?;
        let phone_res = phone_res?;

        if let Some(reason) = text_res.degraded_reason() {
            warn!(%message_id, %reason, "text analysis degraded");
        }
        if let Some(reason) = phone_res.degraded_reason() {
            warn!(%message_id, %reason, "phone validation degraded");
        }

        debug!(%message_id, "deciding");
        self.engine
            .decide(text_res.value(), phone_res.value())
    }

    /// Step 4. The send runs in its own task; if that task dies the request
    /// still completes, just without a delivery result.
    async fn deliver(
        &self,
        message_id: &str,
        receiver: &str,
        text: &str,
        decision: Decision,
        sender: &str,
    ) -> Option<MessageDeliveryResult> {
        debug!(%message_id, to = %anon_hash(receiver), "delivering");
        let delivery = self.delivery.clone();
        let (receiver, text, sender) = (receiver.to_string(), text.to_string(), sender.to_string());

        let task = tokio::spawn(async move {
            delivery.deliver(&receiver, &text, decision, &sender).await
        });
        match task.await {
            Ok(result) => {
                counter!("guard_deliveries_total", "status" => result.status.as_str()).increment(1);
                Some(result)
            }
            Err(e) => {
                error!(%message_id, error = %e, "delivery task failed");
                None
            }
        }
    }

    /// Fail-closed response for an item that never entered the pipeline, such
    /// as a batch entry that failed boundary validation. Counted as BLOCKED.
    pub fn reject(&self, reason: impl Into<String>) -> AnalysisResponse {
        let message_id = new_message_id();
        self.fallback(message_id, Instant::now(), GuardError::InvalidRequest(reason.into()))
    }

    fn fallback(&self, message_id: String, started: Instant, err: GuardError) -> AnalysisResponse {
        error!(%message_id, error = %err, "analysis failed, blocking message");
        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.stats.record(Decision::Blocked);
        counter!("guard_analyses_total", "decision" => Decision::Blocked.as_str()).increment(1);
        counter!("guard_fallbacks_total").increment(1);
        histogram!("guard_analysis_ms").record(processing_time_ms);

        AnalysisResponse {
            message_id,
            decision: Decision::Blocked,
            confidence: FALLBACK_SCORE,
            text_classification: Classification::Spam,
            text_confidence: FALLBACK_SCORE,
            phone_status: PhoneStatus::Unknown,
            phone_risk_score: FALLBACK_SCORE,
            reasoning: format!("Analysis error: {err}"),
            delivery_result: None,
            processing_time_ms,
            timestamp: Utc::now(),
        }
    }

    // ------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------

    pub fn thresholds(&self) -> Thresholds {
        self.engine.current_thresholds()
    }

    /// `false` (and no change) if any supplied threshold is outside <0.0, 1.0>.
    pub fn update_settings(&self, spam: Option<f32>, risk: Option<f32>, strict: Option<bool>) -> bool {
        self.engine.update(spam, risk, strict)
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    /// Record a labeled example. Only the phone side takes effect: the sender
    /// is flagged or validated in the reputation store.
    pub fn add_training_example(
        &self,
        text: &str,
        phone: &str,
        is_spam: bool,
        is_phone_flagged: bool,
    ) -> TrainingOutcome {
        let (risk, reason) = if is_phone_flagged {
            (FLAGGED_TRAINING_RISK, "manually flagged as spam")
        } else {
            (VALIDATED_TRAINING_RISK, "manually validated")
        };

        let phone_added = match self
            .validator
            .add_phone_record(phone, !is_phone_flagged, risk, Some(reason))
        {
            Ok(_) => true,
            Err(e) => {
                warn!(phone = %anon_hash(phone), error = %e, "training example phone rejected");
                false
            }
        };

        info!(
            text_spam = is_spam,
            phone_flagged = is_phone_flagged,
            len = text.chars().count(),
            "training example logged"
        );
        TrainingOutcome {
            phone_added,
            text_logged: true,
        }
    }

    // ------------------------------------------------------------
    // Export
    // ------------------------------------------------------------

    pub fn system_stats(&self) -> SystemStats {
        let snap = self.stats.snapshot();
        SystemStats {
            total_requests: snap.total_requests,
            decisions_by_outcome: snap.decisions_by_outcome,
            phone_database_stats: self.validator.database_stats(),
            model_info: self.analyzer.model_info(),
            uptime_seconds: snap.uptime_seconds,
            decision_thresholds: self.engine.current_thresholds(),
            delivery_stats: self.delivery.stats(),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        self.analyzer.model_info()
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.delivery.stats()
    }

    pub fn health(&self) -> HealthReport {
        let models_loaded = self.analyzer.is_model_loaded();
        let database_connected = !self.validator.store().is_empty();
        HealthReport {
            status: if models_loaded && database_connected {
                "healthy"
            } else {
                "degraded"
            },
            models_loaded,
            database_connected,
            components: ComponentHealth {
                text_classification: models_loaded,
                phone_validation: database_connected,
                decision_engine: true,
            },
            total_requests: self.stats.total_requests(),
        }
    }

    pub fn phone_database(&self) -> PhoneDatabaseInfo {
        let connected = !self.validator.store().is_empty();
        PhoneDatabaseInfo {
            database_stats: self.validator.database_stats(),
            connected,
            status: if connected { "operational" } else { "disconnected" },
            records: self.validator.store().records(),
        }
    }
}

fn new_message_id() -> String {
    format!("msg_{:012x}", rand::random::<u64>() & 0xffff_ffff_ffff)
}

// tests/pipeline_e2e.rs
//
// End-to-end runs of the analysis service with injected classifiers and
// gateways. No HTTP here; see api_http.rs for the router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sms_spam_guard::classifier::{
    load_classifier, FixedClassifier, ModelInfo, TextClassifier, UnavailableClassifier,
};
use sms_spam_guard::delivery::{SimulatedGateway, SmsGateway};
use sms_spam_guard::engine::Thresholds;
use sms_spam_guard::error::{ClassifierError, DeliveryError};
use sms_spam_guard::models::{Classification, Decision, DeliveryStatus, PhoneStatus};
use sms_spam_guard::reputation::PhoneReputationStore;
use sms_spam_guard::AnalysisService;

const EPS: f32 = 1e-5;

/// Seeded sender with status flagged and risk 0.9.
const FLAGGED_SENDER: &str = "+255789123456";
const VALIDATED_SENDER: &str = "0712345678";
const UNKNOWN_SENDER: &str = "0799000111";
const RECEIVER: &str = "0754000222";

struct CountingGateway {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingGateway {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl SmsGateway for CountingGateway {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(DeliveryError::Undelivered)
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

struct PanickingGateway;

#[async_trait]
impl SmsGateway for PanickingGateway {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), DeliveryError> {
        panic!("gateway driver crashed");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

struct PanickingClassifier;

impl TextClassifier for PanickingClassifier {
    fn predict(&self, _: &str) -> Result<(Classification, f32), ClassifierError> {
        panic!("model exploded");
    }

    fn model_info(&self) -> ModelInfo {
        FixedClassifier::new(Classification::Ham, 0.5).model_info()
    }
}

fn service_with(classifier: Arc<dyn TextClassifier>, gateway: Arc<dyn SmsGateway>) -> AnalysisService {
    AnalysisService::new(
        classifier,
        Arc::new(PhoneReputationStore::default_seed()),
        gateway,
        Thresholds::default(),
        1000,
    )
}

fn fixed(label: Classification, conf: f32) -> AnalysisService {
    service_with(
        Arc::new(FixedClassifier::new(label, conf)),
        Arc::new(SimulatedGateway::new(1.0)),
    )
}

#[tokio::test]
async fn flagged_sender_with_spam_text_is_blocked() {
    let svc = fixed(Classification::Spam, 0.8);
    let r = svc
        .analyze("Umeshinda milioni 50, piga simu", FLAGGED_SENDER, None)
        .await;

    assert_eq!(r.decision, Decision::Blocked);
    assert!((r.confidence - 0.8).abs() < EPS);
    assert_eq!(r.phone_status, PhoneStatus::Flagged);
    assert!((r.phone_risk_score - 0.9).abs() < EPS);
    assert!(r.delivery_result.is_none());
}

#[tokio::test]
async fn friendly_text_from_unknown_sender_gets_content_warning() {
    let svc = fixed(Classification::Ham, 0.9);
    let r = svc.analyze("Hello, how are you?", UNKNOWN_SENDER, None).await;

    assert_eq!(r.phone_status, PhoneStatus::Unknown);
    assert!((r.phone_risk_score - 0.3).abs() < EPS);
    assert_eq!(r.decision, Decision::ContentWarning);
}

#[tokio::test]
async fn stats_sum_matches_total_requests() {
    let svc = fixed(Classification::Ham, 0.95);
    let senders = [VALIDATED_SENDER, FLAGGED_SENDER, UNKNOWN_SENDER, "no digits"];
    for i in 0..12 {
        svc.analyze("Habari za asubuhi", senders[i % senders.len()], None)
            .await;
    }

    let s = svc.system_stats();
    assert_eq!(s.total_requests, 12);
    assert_eq!(s.decisions_by_outcome.values().sum::<u64>(), 12);
    assert_eq!(s.decisions_by_outcome[&Decision::Clean], 3);
    assert_eq!(s.decisions_by_outcome[&Decision::SenderWarning], 3);

    svc.reset_statistics();
    let s = svc.system_stats();
    assert_eq!(s.total_requests, 0);
    assert_eq!(s.decisions_by_outcome.values().sum::<u64>(), 0);
}

#[tokio::test]
async fn concurrent_requests_keep_counts_consistent() {
    let svc = Arc::new(fixed(Classification::Spam, 0.7));
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let svc = svc.clone();
            tokio::spawn(async move { svc.analyze("Tuma pesa", UNKNOWN_SENDER, None).await })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }
    let s = svc.system_stats();
    assert_eq!(s.total_requests, 32);
    assert_eq!(s.decisions_by_outcome.values().sum::<u64>(), 32);
}

#[tokio::test]
async fn non_finite_confidence_fails_closed() {
    let svc = fixed(Classification::Ham, f32::NAN);
    let r = svc.analyze("Habari", VALIDATED_SENDER, Some(RECEIVER)).await;

    assert_eq!(r.decision, Decision::Blocked);
    assert!((r.confidence - 0.5).abs() < EPS);
    assert_eq!(r.text_classification, Classification::Spam);
    assert_eq!(r.phone_status, PhoneStatus::Unknown);
    assert!((r.phone_risk_score - 0.5).abs() < EPS);
    assert!(r.reasoning.starts_with("Analysis error"), "{}", r.reasoning);
    assert!(r.delivery_result.is_none(), "fallback never delivers");

    let s = svc.system_stats();
    assert_eq!(s.total_requests, 1);
    assert_eq!(s.decisions_by_outcome[&Decision::Blocked], 1);
}

#[tokio::test]
async fn panicking_classifier_fails_closed() {
    let svc = service_with(
        Arc::new(PanickingClassifier),
        Arc::new(SimulatedGateway::new(1.0)),
    );
    let r = svc.analyze("Habari", VALIDATED_SENDER, None).await;
    assert_eq!(r.decision, Decision::Blocked);
    assert!(r.reasoning.contains("panicked"), "{}", r.reasoning);
    assert_eq!(svc.system_stats().total_requests, 1);
}

#[tokio::test]
async fn unavailable_model_degrades_to_spam() {
    let svc = service_with(
        Arc::new(UnavailableClassifier {
            reason: "not trained".into(),
        }),
        Arc::new(SimulatedGateway::new(1.0)),
    );
    // Degraded text (spam, 0.5) from a validated sender: moderate spam only.
    let r = svc.analyze("Habari", VALIDATED_SENDER, None).await;
    assert_eq!(r.text_classification, Classification::Spam);
    assert!((r.text_confidence - 0.5).abs() < EPS);
    assert_eq!(r.decision, Decision::ContentWarning);
    assert!(!svc.health().models_loaded);
}

#[tokio::test]
async fn malformed_sender_degrades_to_unknown() {
    let svc = fixed(Classification::Ham, 0.95);
    let r = svc.analyze("Habari", "no digits", None).await;
    assert_eq!(r.phone_status, PhoneStatus::Unknown);
    assert!((r.phone_risk_score - 0.5).abs() < EPS);
    // low spam, risk 0.5: falls to the moderate default
    assert_eq!(r.decision, Decision::ContentWarning);
}

#[tokio::test]
async fn blocked_message_never_reaches_gateway() {
    let gw = CountingGateway::new(false);
    let svc = service_with(Arc::new(FixedClassifier::new(Classification::Spam, 0.9)), gw.clone());

    let r = svc.analyze("Tuma pesa", FLAGGED_SENDER, Some(RECEIVER)).await;
    assert_eq!(r.decision, Decision::Blocked);
    let d = r.delivery_result.expect("receiver given");
    assert_eq!(d.status, DeliveryStatus::Blocked);
    assert!(d.delivered_message.is_none());
    assert_eq!(gw.calls.load(Ordering::SeqCst), 0);

    let ds = svc.delivery_stats();
    assert_eq!(ds.total_deliveries, 1);
    assert_eq!(ds.blocked_messages, 1);
}

#[tokio::test]
async fn clean_message_is_delivered_unlabeled() {
    let gw = CountingGateway::new(false);
    let svc = service_with(Arc::new(FixedClassifier::new(Classification::Ham, 0.95)), gw.clone());

    let r = svc.analyze("Habari rafiki", VALIDATED_SENDER, Some(RECEIVER)).await;
    assert_eq!(r.decision, Decision::Clean);
    let d = r.delivery_result.expect("receiver given");
    assert_eq!(d.status, DeliveryStatus::Delivered);
    assert_eq!(d.delivered_message.as_deref(), Some("Habari rafiki"));
    assert_eq!(gw.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gateway_failure_is_reported_not_raised() {
    let gw = CountingGateway::new(true);
    let svc = service_with(Arc::new(FixedClassifier::new(Classification::Ham, 0.9)), gw);

    let r = svc.analyze("Hello, how are you?", UNKNOWN_SENDER, Some(RECEIVER)).await;
    assert_eq!(r.decision, Decision::ContentWarning);
    let d = r.delivery_result.expect("receiver given");
    assert_eq!(d.status, DeliveryStatus::Failed);
    assert!(d.error_message.is_some());

    let ds = svc.system_stats().delivery_stats;
    assert_eq!(ds.failed_deliveries, 1);
    assert_eq!(ds.success_rate, 0.0);
}

#[tokio::test]
async fn gateway_panic_is_reported_as_failed_delivery() {
    let svc = service_with(
        Arc::new(FixedClassifier::new(Classification::Ham, 0.95)),
        Arc::new(PanickingGateway),
    );

    let r = svc.analyze("Habari rafiki", VALIDATED_SENDER, Some(RECEIVER)).await;
    assert_eq!(r.decision, Decision::Clean);
    let d = r.delivery_result.expect("panic must still yield a delivery result");
    assert_eq!(d.status, DeliveryStatus::Failed);
    assert_eq!(d.error_message.as_deref(), Some("gateway error: panicked"));

    let ds = svc.delivery_stats();
    assert_eq!(ds.total_deliveries, 1);
    assert_eq!(ds.failed_deliveries, 1);
    assert_eq!(ds.successful_deliveries, 0);
}

#[tokio::test]
async fn shipped_model_separates_the_scenarios() {
    let model = concat!(env!("CARGO_MANIFEST_DIR"), "/models/spam_nb.json");
    let classifier = load_classifier(model);
    assert!(classifier.model_info().loaded);

    let svc = service_with(classifier, Arc::new(SimulatedGateway::new(1.0)));
    let spam = svc
        .analyze("Umeshinda milioni 50, piga simu", FLAGGED_SENDER, None)
        .await;
    assert_eq!(spam.text_classification, Classification::Spam);
    assert_eq!(spam.decision, Decision::Blocked);

    let ham = svc.analyze("Habari za asubuhi rafiki", VALIDATED_SENDER, None).await;
    assert_eq!(ham.text_classification, Classification::Ham);
    assert_eq!(ham.decision, Decision::Clean);
}

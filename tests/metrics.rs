// tests/metrics.rs
// Single test: the Prometheus recorder is process-global and installs once.
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use sms_spam_guard::{app, metrics::Metrics, GuardConfig};

fn build_app() -> Router {
    let cfg = GuardConfig {
        model_path: concat!(env!("CARGO_MANIFEST_DIR"), "/models/spam_nb.json").into(),
        ..GuardConfig::default()
    };
    let metrics = Metrics::install().expect("first recorder in this test binary");
    app(&cfg).merge(metrics.router())
}

async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let resp = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn analyses_show_up_in_exposition() {
    let app = build_app();

    for (text, sender) in [
        ("Umeshinda milioni 50, piga simu", "0789123456"),
        ("Habari za asubuhi rafiki", "0712345678"),
    ] {
        let body = serde_json::json!({
            "text": text,
            "sender_phone": sender,
            "receiver_phone": "0754000222"
        });
        let resp = app
            .clone()
            .oneshot(
                Request::post("/analyze")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let (status, text) = get_text(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    for needle in [
        "guard_analyses_total",
        "decision=\"BLOCKED\"",
        "decision=\"CLEAN\"",
        "guard_deliveries_total",
        "status=\"blocked\"",
        "guard_analysis_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}

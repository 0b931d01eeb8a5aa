//! SMS Spam Guard: binary entrypoint
//! Boots the Axum HTTP server: config, tracing, the analysis service and metrics.

use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sms_spam_guard::{app, metrics::Metrics, GuardConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sms_spam_guard=info,warn"));

    // The host runtime may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = GuardConfig::load()?;
    info!(
        spam_threshold = cfg.spam_confidence_threshold,
        risk_threshold = cfg.high_risk_threshold,
        strict_mode = cfg.strict_mode,
        model = %cfg.model_path.display(),
        "configuration loaded"
    );

    let mut router = app(&cfg);
    match Metrics::install() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => warn!(error = %e, "prometheus recorder not installed; /metrics disabled"),
    }

    Ok(router.into())
}

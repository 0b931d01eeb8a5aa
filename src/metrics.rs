use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the guard series.
    /// Fails if a recorder is already installed in this process.
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;

        describe_counter!(
            "guard_analyses_total",
            "Finished analyses, labeled by decision."
        );
        describe_counter!(
            "guard_fallbacks_total",
            "Analyses that ended in the fail-closed fallback."
        );
        describe_counter!(
            "guard_deliveries_total",
            "Delivery attempts, labeled by status."
        );
        describe_histogram!("guard_analysis_ms", "End-to-end analysis time in milliseconds.");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

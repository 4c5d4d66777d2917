//! Prometheus metrics and the probe/metrics HTTP endpoint.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Reconciliation counters, labelled by resource kind
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    reconciliations: IntCounterVec,
    failures: IntCounterVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register the controller metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconciliations = IntCounterVec::new(
            Opts::new("metal_reconciliations_total", "Reconciliation passes started"),
            &["kind"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;
        let failures = IntCounterVec::new(
            Opts::new(
                "metal_reconcile_failures_total",
                "Reconciliation passes that returned an error",
            ),
            &["kind", "reason"],
        )?;
        registry.register(Box::new(failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            reconciliations,
            failures,
        })
    }

    /// Count one reconciliation attempt of `kind`
    pub fn reconciled(&self, kind: &str) {
        self.reconciliations.with_label_values(&[kind]).inc();
    }

    /// Count one failed reconciliation of `kind`, labelled by error class
    pub fn failed(&self, kind: &str, err: &ControllerError) {
        self.failures.with_label_values(&[kind, reason(err)]).inc();
    }

    /// Metrics in Prometheus text format
    pub fn export(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

fn reason(err: &ControllerError) -> &'static str {
    match err {
        ControllerError::NotYetReady(_) => "not_ready",
        ControllerError::Conflict(_) => "conflict",
        ControllerError::PoolExhausted(_) => "pool_exhausted",
        ControllerError::AddressConflict(_) => "address_conflict",
        ControllerError::NotFound(_) => "not_found",
        ControllerError::StoreUnavailable(_) => "store_unavailable",
        ControllerError::InvalidConfig(_) => "invalid_config",
        ControllerError::Store(_) | ControllerError::Kube(_) | ControllerError::Watch(_) => {
            "store_error"
        }
    }
}

async fn metrics_handler(State(metrics): State<Metrics>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.export(),
    )
        .into_response()
}

async fn probe_handler() -> &'static str {
    "ok"
}

/// Router serving `/metrics`, `/healthz` and `/readyz`
pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(probe_handler))
        .route("/readyz", get(probe_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serve the metrics router until the process exits
pub async fn serve(addr: SocketAddr, metrics: Metrics) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        ControllerError::Watch(format!("failed to bind metrics listener {}: {}", addr, e))
    })?;
    info!("Serving metrics and probes on {}", addr);
    axum::serve(listener, router(metrics))
        .await
        .map_err(|e| ControllerError::Watch(format!("metrics server failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.reconciled("Cluster");
        metrics.failed("Cluster", &ControllerError::NotYetReady("pool".to_string()));

        let output = metrics.export();
        assert!(output.contains("metal_reconciliations_total{kind=\"Cluster\"} 1"));
        assert!(output.contains("reason=\"not_ready\""));
    }
}

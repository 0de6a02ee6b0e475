//! Health check handlers
//!
//! - `/health` is a liveness probe and never touches the store.
//! - `/ready` probes the ledger store and reports the oracle's circuit state.
//! - `/metrics` exports the in-process registry.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::{CircuitState, ComponentHealth};
use crate::metrics::metric_names;
use crate::server::AppState;
use crate::telemetry::SERVICE_NAME;

/// Response for the basic health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall health status
    pub status: HealthStatus,
    /// Service name
    pub service: &'static str,
    /// Service version
    pub version: &'static str,
    /// Timestamp of health check
    pub timestamp: String,
}

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components healthy
    Healthy,
    /// Some components degraded but operational
    Degraded,
    /// Critical components unhealthy
    Unhealthy,
}

impl From<&ComponentHealth> for HealthStatus {
    fn from(health: &ComponentHealth) -> Self {
        match health {
            ComponentHealth::Healthy => HealthStatus::Healthy,
            ComponentHealth::Degraded { .. } => HealthStatus::Degraded,
            ComponentHealth::Unhealthy { .. } => HealthStatus::Unhealthy,
        }
    }
}

/// Individual component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    /// Component name
    pub name: &'static str,
    /// Health status
    pub status: HealthStatus,
    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl ComponentStatus {
    fn from_health(name: &'static str, health: ComponentHealth, elapsed_ms: Option<u64>) -> Self {
        let status = HealthStatus::from(&health);
        let message = match health {
            ComponentHealth::Healthy => None,
            ComponentHealth::Degraded { reason } | ComponentHealth::Unhealthy { reason } => {
                Some(reason)
            }
        };
        Self {
            name,
            status,
            message,
            response_time_ms: elapsed_ms,
        }
    }
}

/// Response for the readiness endpoint
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub store: ComponentStatus,
    pub oracle: ComponentStatus,
    pub chain_height: u64,
}

/// Basic health check endpoint.
///
/// Use this for liveness probes.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Readiness check endpoint.
///
/// 503 when the store is unreachable. An open oracle circuit only degrades
/// readiness, since appends and chain reads do not need the oracle.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let start = Instant::now();
    let store_health = state.store.health().await;
    let elapsed = start.elapsed().as_millis() as u64;
    let store = ComponentStatus::from_health("ledger_store", store_health, Some(elapsed));

    let oracle = ComponentStatus::from_health("oracle", oracle_health(&state).await, None);

    let status = overall_status(&store, &oracle);
    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };

    (
        code,
        Json(ReadinessResponse {
            status,
            store,
            oracle,
            chain_height: state.metrics.get_gauge(metric_names::CHAIN_HEIGHT).await,
        }),
    )
}

async fn oracle_health(state: &AppState) -> ComponentHealth {
    let Some(oracle) = state.oracle.as_ref() else {
        return ComponentHealth::Degraded {
            reason: "not configured".to_string(),
        };
    };
    match oracle.circuit_state().await {
        Some(CircuitState::Open) => ComponentHealth::Degraded {
            reason: "circuit breaker is open".to_string(),
        },
        Some(CircuitState::HalfOpen) => ComponentHealth::Degraded {
            reason: "circuit breaker is half open".to_string(),
        },
        Some(CircuitState::Closed) | None => ComponentHealth::Healthy,
    }
}

/// Store is critical; the oracle only ever degrades.
fn overall_status(store: &ComponentStatus, oracle: &ComponentStatus) -> HealthStatus {
    if store.status == HealthStatus::Unhealthy {
        return HealthStatus::Unhealthy;
    }
    if store.status == HealthStatus::Degraded || oracle.status != HealthStatus::Healthy {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub format: Option<String>,
}

/// Metrics endpoint: Prometheus text by default, JSON with `?format=json`.
pub async fn metrics_export(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    if query.format.as_deref() == Some("json") {
        return Json(state.metrics.to_json().await).into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus().await,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(status: HealthStatus) -> ComponentStatus {
        ComponentStatus {
            name: "c",
            status,
            message: None,
            response_time_ms: None,
        }
    }

    #[test]
    fn test_overall_status() {
        use HealthStatus::*;
        assert_eq!(overall_status(&component(Healthy), &component(Healthy)), Healthy);
        assert_eq!(overall_status(&component(Healthy), &component(Degraded)), Degraded);
        assert_eq!(overall_status(&component(Unhealthy), &component(Healthy)), Unhealthy);
        assert_eq!(overall_status(&component(Degraded), &component(Healthy)), Degraded);
    }

    #[test]
    fn test_component_status_carries_reason() {
        let status = ComponentStatus::from_health(
            "ledger_store",
            ComponentHealth::Unhealthy {
                reason: "connection refused".into(),
            },
            Some(3),
        );
        assert_eq!(status.status, HealthStatus::Unhealthy);
        assert_eq!(status.message.as_deref(), Some("connection refused"));
    }
}

//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use switchyard_core::{now_millis, HealthBody};

use super::AppState;
use crate::network::HealthState;

/// `GET /health`: always 200; `status` is `UP` only while Ready.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: state.shutdown.health_state().as_status().to_string(),
        service: state.service_name.to_string(),
        timestamp: now_millis(),
    })
}

/// Liveness probe. Always 200.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when Ready, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::test_support::app_state;

    #[tokio::test]
    async fn health_reports_up_with_service_name() {
        let state = app_state();
        let body = health_handler(State(state)).await.0;
        assert_eq!(body.status, "UP");
        assert_eq!(body.service, "gateway");
        assert!(body.timestamp > 0);
    }

    #[tokio::test]
    async fn health_reports_down_while_draining() {
        let state = app_state();
        state.shutdown.begin_drain();
        assert_eq!(health_handler(State(state)).await.0.status, "DOWN");
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = app_state();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);
        state.shutdown.begin_drain();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use slashbot_slack::DispatchPipeline;

#[derive(Clone)]
pub struct HealthState {
    pipeline: Arc<DispatchPipeline>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub routes: usize,
    pub in_flight_deliveries: usize,
    pub checked_at: String,
}

pub fn router(pipeline: Arc<DispatchPipeline>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { pipeline })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let routes = state.pipeline.route_count();
    let ready = routes > 0;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        routes,
        in_flight_deliveries: state.pipeline.delivery().in_flight(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

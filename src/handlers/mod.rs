pub mod callbacks;
pub mod simulator;
pub mod transactions;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::health::{check_health, DependencyChecker, GatewayChecker};
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let checkers: Vec<Box<dyn DependencyChecker>> = state
        .gateways
        .gateways()
        .unwrap_or_default()
        .into_iter()
        .map(|gateway| Box::new(GatewayChecker::new(gateway)) as Box<dyn DependencyChecker>)
        .collect();

    let report = check_health(checkers, state.start_time).await;

    // Return 503 only when no gateway can take traffic
    let status_code = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}

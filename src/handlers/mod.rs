pub mod expenses;

use crate::health::check_health;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(
        state.health.postgres.as_ref(),
        state.health.payment_gateway.as_ref(),
        state.start_time,
    )
    .await;

    // Return 503 if database is down, 200 otherwise
    let status_code = if report.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}

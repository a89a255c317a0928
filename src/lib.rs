pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod payment;
pub mod ports;
pub mod services;
pub mod startup;
pub mod use_cases;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::health::DependencyChecker;
use crate::middleware::JwtConfig;
use crate::use_cases::ExpenseLifecycle;

/// Checkers consulted by `/api/health`.
#[derive(Clone)]
pub struct HealthCheckers {
    pub postgres: Arc<dyn DependencyChecker>,
    pub payment_gateway: Arc<dyn DependencyChecker>,
}

#[derive(Clone)]
pub struct AppState {
    pub expenses: ExpenseLifecycle,
    pub auth: JwtConfig,
    pub health: HealthCheckers,
    pub start_time: Instant,
}

impl FromRef<AppState> for JwtConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/expenses",
            post(handlers::expenses::submit_expense).get(handlers::expenses::list_expenses),
        )
        .route(
            "/api/expenses/pending",
            get(handlers::expenses::list_pending),
        )
        .route("/api/expenses/:id", get(handlers::expenses::get_expense))
        .route(
            "/api/expenses/:id/approval",
            get(handlers::expenses::get_approval),
        )
        .route(
            "/api/expenses/:id/approve",
            put(handlers::expenses::approve_expense),
        )
        .route(
            "/api/expenses/:id/reject",
            put(handlers::expenses::reject_expense),
        )
        .layer(axum::middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .with_state(state)
}

/// CORS for the configured origins. `*` allows any origin; an empty list denies
/// cross-origin requests.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow any origin");
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        if parsed.len() != origins.len() {
            tracing::warn!("Ignoring unparseable entries in CORS_ALLOWED_ORIGINS");
        }
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_origin(allow_origin)
}

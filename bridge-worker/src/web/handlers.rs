//! Health endpoint handlers.
//!
//! `/__health` always answers 200 with the full report; callers read `ok`
//! from the body. `/__gtg` is the binary signal load balancers poll.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};

use crate::health::{HealthChecker, HealthReport};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub checker: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(checker: HealthChecker) -> Self {
        Self {
            checker: Arc::new(checker),
        }
    }
}

/// Full dependency report.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = HealthReport::new(state.checker.health_report().await);

    if report.ok {
        info!("health_check_ok");
    } else {
        let failing: Vec<&str> = report
            .checks
            .iter()
            .filter(|c| !c.ok)
            .map(|c| c.name.as_str())
            .collect();
        warn!(failing = ?failing, "health_check_failed");
    }

    ([(header::CACHE_CONTROL, "no-cache")], Json(report))
}

/// Good-to-go: 200 when every dependency is reachable, 503 otherwise.
pub async fn good_to_go(State(state): State<AppState>) -> impl IntoResponse {
    match state.checker.good_to_go().await {
        Ok(()) => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-cache")],
            "OK".to_string(),
        ),
        Err(reason) => {
            warn!(reason = %reason, "gtg_failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CACHE_CONTROL, "no-cache")],
                reason,
            )
        }
    }
}

/// Liveness without touching dependencies.
pub async fn ping() -> &'static str {
    "pong"
}

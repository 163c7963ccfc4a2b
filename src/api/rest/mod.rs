pub mod attempts;
pub mod bins;
pub mod cod;
pub mod couriers;
pub mod dashboard;
pub mod pickups;
pub mod run_sheets;
pub mod shipments;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(couriers::router())
        .merge(bins::router())
        .merge(shipments::router())
        .merge(run_sheets::router())
        .merge(attempts::router())
        .merge(cod::router())
        .merge(pickups::router())
        .merge(dashboard::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// `*` (or an empty list) allows any origin; otherwise only the listed ones.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(origin = %origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    shipments: usize,
    couriers: usize,
    run_sheets: usize,
    pickups: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        shipments: state.shipments.len(),
        couriers: state.couriers.len(),
        run_sheets: state.run_sheets.len(),
        pickups: state.pickups.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

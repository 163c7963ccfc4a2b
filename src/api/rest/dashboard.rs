use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::dashboard::{compute_stats, DashboardStats};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dashboard/stats", get(stats))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<DashboardStats> {
    Json(compute_stats(&state))
}

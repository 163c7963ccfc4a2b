use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;

use crate::engine::attempts::{self, AttemptRecorded, RecordAttemptRequest};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/attempts", post(record_attempt))
}

async fn record_attempt(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecordAttemptRequest>,
) -> Result<Json<AttemptRecorded>, AppError> {
    attempts::record_attempt(&state, payload).map(Json)
}

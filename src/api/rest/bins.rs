use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::bins::{self, CreateBinRequest};
use crate::error::AppError;
use crate::models::bin::BinLocation;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bins", post(create_bin).get(list_bins))
        .route("/bins/:id", get(get_bin))
}

async fn create_bin(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBinRequest>,
) -> Result<Json<BinLocation>, AppError> {
    bins::create_bin(&state, payload).map(Json)
}

async fn list_bins(State(state): State<Arc<AppState>>) -> Json<Vec<BinLocation>> {
    Json(bins::list_bins(&state))
}

async fn get_bin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BinLocation>, AppError> {
    bins::get_bin(&state, id).map(Json)
}

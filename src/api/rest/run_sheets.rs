use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::run_sheets::{self, CreateRunSheetRequest, ScanOutReport};
use crate::error::AppError;
use crate::models::run_sheet::RunSheet;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run-sheets", post(create_run_sheet).get(list_run_sheets))
        .route("/run-sheets/:id", get(get_run_sheet))
        .route("/run-sheets/:id/scan-out", post(scan_out))
        .route("/run-sheets/:id/scan-in", post(scan_in))
}

#[derive(Deserialize)]
pub struct RunSheetQuery {
    pub courier_id: Option<Uuid>,
}

async fn create_run_sheet(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRunSheetRequest>,
) -> Result<Json<RunSheet>, AppError> {
    run_sheets::create_run_sheet(&state, payload).map(Json)
}

async fn list_run_sheets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunSheetQuery>,
) -> Json<Vec<RunSheet>> {
    Json(run_sheets::list_run_sheets(&state, query.courier_id))
}

async fn get_run_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSheet>, AppError> {
    run_sheets::get_run_sheet(&state, id).map(Json)
}

async fn scan_out(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanOutReport>, AppError> {
    run_sheets::scan_out(&state, id).map(Json)
}

async fn scan_in(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSheet>, AppError> {
    run_sheets::scan_in(&state, id).map(Json)
}

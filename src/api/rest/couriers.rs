use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::couriers::{self, CreateCourierRequest, UpdateCourierRequest};
use crate::engine::ledger::{self, CourierLedger};
use crate::error::AppError;
use crate::models::courier::{Courier, CourierStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route(
            "/couriers/:id",
            get(get_courier).put(update_courier).delete(delete_courier),
        )
        .route("/couriers/:id/status", patch(update_courier_status))
        .route("/couriers/:id/ledger", get(courier_ledger))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CourierStatus,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    couriers::create_courier(&state, payload).map(Json)
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    Json(couriers::list_couriers(&state))
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Courier>, AppError> {
    couriers::get_courier(&state, id).map(Json)
}

async fn update_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    couriers::update_courier(&state, id, payload).map(Json)
}

async fn update_courier_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Courier>, AppError> {
    couriers::set_courier_status(&state, id, payload.status).map(Json)
}

async fn delete_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Courier>, AppError> {
    couriers::delete_courier(&state, id).map(Json)
}

async fn courier_ledger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourierLedger>, AppError> {
    ledger::courier_ledger(&state, id).map(Json)
}

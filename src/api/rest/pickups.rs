use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::pickups::{
    self, CompletePickupRequest, CreatePickupRequest, PickupCompletion, PickupFilter,
};
use crate::error::AppError;
use crate::models::pickup::{Pickup, ShoppingHistoryEntry};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pickups", post(create_pickup).get(list_pickups))
        .route("/pickups/:id", get(get_pickup))
        .route("/pickups/:id/assign/:courier_id", post(assign_pickup))
        .route("/pickups/:id/complete", post(complete_pickup))
        .route("/pickups/:id/cancel", post(cancel_pickup))
        .route("/pickups/:id/history", get(shopping_history))
}

async fn create_pickup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePickupRequest>,
) -> Result<Json<Pickup>, AppError> {
    pickups::create_pickup(&state, payload).map(Json)
}

async fn list_pickups(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<PickupFilter>,
) -> Json<Vec<Pickup>> {
    Json(pickups::list_pickups(&state, &filter))
}

async fn get_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Pickup>, AppError> {
    pickups::get_pickup(&state, id).map(Json)
}

async fn assign_pickup(
    State(state): State<Arc<AppState>>,
    Path((id, courier_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Pickup>, AppError> {
    pickups::assign_pickup(&state, id, courier_id).map(Json)
}

async fn complete_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompletePickupRequest>>,
) -> Result<Json<PickupCompletion>, AppError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    pickups::complete_pickup(&state, id, payload).map(Json)
}

async fn cancel_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Pickup>, AppError> {
    pickups::cancel_pickup(&state, id).map(Json)
}

async fn shopping_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ShoppingHistoryEntry>>, AppError> {
    pickups::shopping_history(&state, id).map(Json)
}

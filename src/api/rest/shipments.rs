use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::engine::attempts;
use crate::engine::ledger::{self, ReconcileRequest};
use crate::engine::shipments::{
    self, BulkImportReport, CreateShipmentRequest, FollowUpRequest, RescheduleRequest,
    ShipmentFilter, UpdateShipmentRequest,
};
use crate::error::AppError;
use crate::models::attempt::DeliveryAttempt;
use crate::models::batch::BatchReport;
use crate::models::shipment::{ProofBundle, Shipment};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", post(create_shipment).get(list_shipments))
        .route("/shipments/bulk", post(bulk_create))
        .route("/shipments/in-scan", post(in_scan))
        .route("/shipments/assign-bin", post(assign_to_bin))
        .route("/shipments/assign-champ", post(assign_to_champ))
        .route("/shipments/return-to-warehouse", post(return_to_warehouse))
        .route("/shipments/awb/:awb", get(get_by_awb))
        .route(
            "/shipments/:id",
            get(get_shipment)
                .put(update_shipment)
                .delete(delete_shipment),
        )
        .route("/shipments/:id/assign/:courier_id", post(assign_courier))
        .route("/shipments/:id/unassign", post(unassign_courier))
        .route("/shipments/:id/mark-delivered", post(mark_delivered))
        .route("/shipments/:id/pickup-completed", post(mark_pickup_completed))
        .route("/shipments/:id/reschedule", post(reschedule))
        .route("/shipments/:id/follow-up", post(add_follow_up))
        .route("/shipments/:id/attempts", get(list_attempts))
        .route("/shipments/:id/reconcile", post(reconcile))
}

#[derive(Deserialize)]
pub struct InScanRequest {
    pub awb: String,
}

#[derive(Deserialize)]
pub struct AssignBinRequest {
    pub shipment_ids: Vec<Uuid>,
    pub bin_id: Uuid,
}

#[derive(Deserialize)]
pub struct AssignChampRequest {
    pub shipment_ids: Vec<Uuid>,
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct ShipmentIdsRequest {
    pub shipment_ids: Vec<Uuid>,
}

async fn create_shipment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateShipmentRequest>,
) -> Result<Json<Shipment>, AppError> {
    shipments::create_shipment(&state, payload).map(Json)
}

async fn bulk_create(
    State(state): State<Arc<AppState>>,
    Json(rows): Json<Vec<Value>>,
) -> Json<BulkImportReport> {
    Json(shipments::bulk_create(&state, rows))
}

async fn list_shipments(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ShipmentFilter>,
) -> Json<Vec<Shipment>> {
    Json(shipments::list_shipments(&state, &filter))
}

async fn get_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    shipments::get_shipment(&state, id).map(Json)
}

async fn get_by_awb(
    State(state): State<Arc<AppState>>,
    Path(awb): Path<String>,
) -> Result<Json<Shipment>, AppError> {
    shipments::get_by_awb(&state, &awb).map(Json)
}

async fn update_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateShipmentRequest>,
) -> Result<Json<Shipment>, AppError> {
    shipments::update_shipment(&state, id, payload).map(Json)
}

async fn delete_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    shipments::delete_shipment(&state, id).map(Json)
}

async fn in_scan(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InScanRequest>,
) -> Result<Json<Shipment>, AppError> {
    shipments::in_scan(&state, &payload.awb).map(Json)
}

async fn assign_to_bin(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AssignBinRequest>,
) -> Result<Json<BatchReport<Shipment>>, AppError> {
    shipments::assign_to_bin(&state, &payload.shipment_ids, payload.bin_id).map(Json)
}

async fn assign_to_champ(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AssignChampRequest>,
) -> Result<Json<BatchReport<Shipment>>, AppError> {
    shipments::assign_to_champ(&state, &payload.shipment_ids, payload.courier_id).map(Json)
}

async fn return_to_warehouse(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShipmentIdsRequest>,
) -> Json<BatchReport<Shipment>> {
    Json(shipments::return_to_warehouse(&state, &payload.shipment_ids))
}

async fn assign_courier(
    State(state): State<Arc<AppState>>,
    Path((id, courier_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Shipment>, AppError> {
    shipments::assign_courier(&state, id, courier_id).map(Json)
}

async fn unassign_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    shipments::unassign_courier(&state, id).map(Json)
}

// Proof is optional; a request without a JSON body is accepted.
async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    proof: Option<Json<ProofBundle>>,
) -> Result<Json<Shipment>, AppError> {
    shipments::mark_delivered(&state, id, proof.map(|Json(p)| p)).map(Json)
}

async fn mark_pickup_completed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    proof: Option<Json<ProofBundle>>,
) -> Result<Json<Shipment>, AppError> {
    shipments::mark_pickup_completed(&state, id, proof.map(|Json(p)| p)).map(Json)
}

async fn reschedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RescheduleRequest>,
) -> Result<Json<Shipment>, AppError> {
    shipments::reschedule(&state, id, payload).map(Json)
}

async fn add_follow_up(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FollowUpRequest>,
) -> Result<Json<Shipment>, AppError> {
    shipments::add_follow_up(&state, id, payload).map(Json)
}

async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryAttempt>>, AppError> {
    attempts::list_attempts(&state, id).map(Json)
}

async fn reconcile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReconcileRequest>,
) -> Result<Json<Shipment>, AppError> {
    ledger::reconcile(&state, id, payload).map(Json)
}

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::ledger;
use crate::models::shipment::Shipment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/cod/pending", get(pending_reconciliation))
}

async fn pending_reconciliation(State(state): State<Arc<AppState>>) -> Json<Vec<Shipment>> {
    Json(ledger::pending_reconciliation(&state))
}

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierStatus};
use crate::state::AppState;
use crate::store::UpdateOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub vehicle_number: String,
    pub vehicle_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCourierRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub vehicle_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub status: Option<CourierStatus>,
}

fn non_empty(field: &str, raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn create_courier(state: &AppState, req: CreateCourierRequest) -> Result<Courier, AppError> {
    let now = Utc::now();
    let courier = Courier {
        id: Uuid::new_v4(),
        name: non_empty("name", &req.name)?,
        phone: non_empty("phone", &req.phone)?,
        email: req.email.filter(|e| !e.trim().is_empty()),
        vehicle_number: non_empty("vehicle_number", &req.vehicle_number)?,
        vehicle_type: non_empty("vehicle_type", &req.vehicle_type)?,
        status: CourierStatus::Active,
        total_deliveries: 0,
        pending_cod: 0,
        created_at: now,
        updated_at: now,
    };

    let courier = state.couriers.insert(courier)?;
    info!(courier_id = %courier.id, name = %courier.name, "courier created");
    Ok(courier)
}

pub fn list_couriers(state: &AppState) -> Vec<Courier> {
    let mut couriers = state.couriers.all();
    couriers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    couriers
}

pub fn get_courier(state: &AppState, id: Uuid) -> Result<Courier, AppError> {
    state.couriers.require(&id, "courier")
}

/// Edits contact and vehicle fields. Ledger counters are never written here.
pub fn update_courier(
    state: &AppState,
    id: Uuid,
    req: UpdateCourierRequest,
) -> Result<Courier, AppError> {
    let name = req.name.as_deref().map(|v| non_empty("name", v)).transpose()?;
    let phone = req.phone.as_deref().map(|v| non_empty("phone", v)).transpose()?;
    let vehicle_number = req
        .vehicle_number
        .as_deref()
        .map(|v| non_empty("vehicle_number", v))
        .transpose()?;
    let vehicle_type = req
        .vehicle_type
        .as_deref()
        .map(|v| non_empty("vehicle_type", v))
        .transpose()?;

    if name.is_none()
        && phone.is_none()
        && req.email.is_none()
        && vehicle_number.is_none()
        && vehicle_type.is_none()
        && req.status.is_none()
    {
        return Err(AppError::Validation("no update data provided".to_string()));
    }

    state
        .couriers
        .update(&id, |courier| {
            if let Some(v) = name {
                courier.name = v;
            }
            if let Some(v) = phone {
                courier.phone = v;
            }
            if let Some(v) = req.email {
                courier.email = Some(v);
            }
            if let Some(v) = vehicle_number {
                courier.vehicle_number = v;
            }
            if let Some(v) = vehicle_type {
                courier.vehicle_type = v;
            }
            if let Some(v) = req.status {
                courier.status = v;
            }
            courier.updated_at = Utc::now();
        })
        .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
}

pub fn set_courier_status(
    state: &AppState,
    id: Uuid,
    status: CourierStatus,
) -> Result<Courier, AppError> {
    update_courier(
        state,
        id,
        UpdateCourierRequest {
            status: Some(status),
            ..Default::default()
        },
    )
}

/// A courier still holding unreconciled cash stays on the books.
pub fn delete_courier(state: &AppState, id: Uuid) -> Result<Courier, AppError> {
    let courier = match state.couriers.remove_if(&id, |c| c.pending_cod == 0) {
        UpdateOutcome::Updated(courier) => courier,
        UpdateOutcome::NotModified(courier) => {
            return Err(AppError::PreconditionFailed(format!(
                "courier {id} still holds {} in pending COD",
                courier.pending_cod
            )));
        }
        UpdateOutcome::NotFound => {
            return Err(AppError::NotFound(format!("courier {id} not found")));
        }
    };
    info!(courier_id = %id, pending_cod = courier.pending_cod, "courier deleted");
    Ok(courier)
}

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bin::BinLocation;
use crate::state::AppState;
use crate::store::UpdateOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBinRequest {
    pub code: String,
    pub route_tag: String,
    pub capacity: u32,
}

pub fn create_bin(state: &AppState, req: CreateBinRequest) -> Result<BinLocation, AppError> {
    let code = req.code.trim();
    if code.is_empty() {
        return Err(AppError::Validation("code cannot be empty".to_string()));
    }
    if req.capacity == 0 {
        return Err(AppError::Validation("capacity must be > 0".to_string()));
    }

    let now = Utc::now();
    let id = Uuid::new_v4();
    match state.bin_codes.entry(code.to_string()) {
        Entry::Occupied(_) => {
            return Err(AppError::Validation(format!("bin code {code} already exists")));
        }
        Entry::Vacant(slot) => {
            slot.insert(id);
        }
    }

    let bin = BinLocation {
        id,
        code: code.to_string(),
        route_tag: req.route_tag.trim().to_string(),
        capacity: req.capacity,
        current_count: 0,
        created_at: now,
        updated_at: now,
    };
    if let Err(err) = state.bin_locations.insert(bin.clone()) {
        state.bin_codes.remove(code);
        return Err(err);
    }

    info!(bin_id = %bin.id, code = %bin.code, capacity = bin.capacity, "bin location created");
    Ok(bin)
}

pub fn list_bins(state: &AppState) -> Vec<BinLocation> {
    let mut bins = state.bin_locations.all();
    bins.sort_by(|a, b| a.code.cmp(&b.code));
    bins
}

pub fn get_bin(state: &AppState, id: Uuid) -> Result<BinLocation, AppError> {
    state.bin_locations.require(&id, "bin location")
}

/// Hands one slot of `bin_id` back. Never drops occupancy below zero.
pub(crate) fn release_slot(state: &AppState, bin_id: Uuid) {
    let now = Utc::now();
    let released = state.bin_locations.update_if(
        &bin_id,
        |bin| bin.current_count > 0,
        |bin| {
            bin.current_count -= 1;
            bin.updated_at = now;
        },
    );
    match released {
        UpdateOutcome::Updated(bin) => {
            info!(bin_id = %bin_id, occupancy = bin.current_count, "bin slot released");
        }
        UpdateOutcome::NotModified(_) => warn!(bin_id = %bin_id, "bin already empty"),
        UpdateOutcome::NotFound => {}
    }
}

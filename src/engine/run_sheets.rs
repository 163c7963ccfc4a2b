use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::batch::BatchReport;
use crate::models::run_sheet::RunSheet;
use crate::models::shipment::{PaymentMethod, Shipment, ShipmentStatus};
use crate::state::AppState;
use crate::store::UpdateOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunSheetRequest {
    pub courier_id: Uuid,
    pub shipment_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScanOutReport {
    pub run_sheet: RunSheet,
    pub dispatched: BatchReport<Shipment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestTotals {
    pub total_value: i64,
    pub cash_to_collect: i64,
    pub card_to_collect: i64,
}

/// Sums declared values; cash and card split that same total by payment
/// method, so they add up to it whenever no member is prepaid.
pub fn manifest_totals<'a>(
    shipments: impl IntoIterator<Item = &'a Shipment>,
) -> Result<ManifestTotals, AppError> {
    let overflow = || AppError::Validation("run sheet totals overflow".to_string());
    shipments
        .into_iter()
        .try_fold(ManifestTotals::default(), |mut totals, shipment| {
            let value = shipment.value;
            totals.total_value = totals.total_value.checked_add(value).ok_or_else(overflow)?;
            match shipment.payment_method {
                PaymentMethod::Cash => {
                    totals.cash_to_collect =
                        totals.cash_to_collect.checked_add(value).ok_or_else(overflow)?;
                }
                PaymentMethod::Card => {
                    totals.card_to_collect =
                        totals.card_to_collect.checked_add(value).ok_or_else(overflow)?;
                }
                PaymentMethod::Prepaid => {}
            }
            Ok(totals)
        })
}

/// Builds a manifest from the candidates currently assigned to the courier
/// and stamps each of them with the sheet id. Totals are computed once here
/// and never recomputed.
pub fn create_run_sheet(state: &AppState, req: CreateRunSheetRequest) -> Result<RunSheet, AppError> {
    state.couriers.require(&req.courier_id, "courier")?;
    if req.shipment_ids.is_empty() {
        return Err(AppError::Validation("shipment_ids cannot be empty".to_string()));
    }

    let mut seen = HashSet::new();
    let members: Vec<Shipment> = req
        .shipment_ids
        .iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| state.shipments.get(id))
        .filter(|s| s.courier_id == Some(req.courier_id))
        .collect();

    if members.is_empty() {
        return Err(AppError::PreconditionFailed(format!(
            "none of the shipments are assigned to courier {}",
            req.courier_id
        )));
    }

    let totals = manifest_totals(&members)?;
    let run_sheet = state.run_sheets.insert(RunSheet {
        id: Uuid::new_v4(),
        courier_id: req.courier_id,
        shipment_ids: members.iter().map(|s| s.id).collect(),
        total_value: totals.total_value,
        cash_to_collect: totals.cash_to_collect,
        card_to_collect: totals.card_to_collect,
        is_scanned_out: false,
        scanned_out_at: None,
        is_scanned_in: false,
        scanned_in_at: None,
        created_at: Utc::now(),
    })?;

    let now = Utc::now();
    for shipment in &members {
        state.shipments.update(&shipment.id, |s| {
            s.run_sheet_id = Some(run_sheet.id);
            s.touch(now);
        });
    }

    info!(
        run_sheet_id = %run_sheet.id,
        courier_id = %run_sheet.courier_id,
        shipments = run_sheet.shipment_ids.len(),
        total_value = run_sheet.total_value,
        cash_to_collect = run_sheet.cash_to_collect,
        card_to_collect = run_sheet.card_to_collect,
        "run sheet created"
    );
    Ok(run_sheet)
}

pub fn list_run_sheets(state: &AppState, courier_id: Option<Uuid>) -> Vec<RunSheet> {
    let mut sheets = state
        .run_sheets
        .find(|r| courier_id.is_none_or(|id| r.courier_id == id));
    sheets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sheets
}

pub fn get_run_sheet(state: &AppState, id: Uuid) -> Result<RunSheet, AppError> {
    state.run_sheets.require(&id, "run sheet")
}

/// One-way outbound gate. Every shipment still referencing the sheet moves
/// to `out_for_delivery` where that edge is legal; the rest are reported.
pub fn scan_out(state: &AppState, id: Uuid) -> Result<ScanOutReport, AppError> {
    let now = Utc::now();
    let run_sheet = match state.run_sheets.update_if(
        &id,
        |r| !r.is_scanned_out,
        |r| {
            r.is_scanned_out = true;
            r.scanned_out_at = Some(now);
        },
    ) {
        UpdateOutcome::Updated(run_sheet) => run_sheet,
        UpdateOutcome::NotModified(_) => {
            state.metrics.transition("run_sheet", false);
            return Err(AppError::PreconditionFailed(format!(
                "run sheet {id} is already scanned out"
            )));
        }
        UpdateOutcome::NotFound => {
            return Err(AppError::NotFound(format!("run sheet {id} not found")));
        }
    };
    state.metrics.transition("run_sheet", true);

    let target = ShipmentStatus::OutForDelivery;
    let mut dispatched = BatchReport::new();
    for member in state.shipments.find(|s| s.run_sheet_id == Some(id)) {
        let outcome = state.shipments.update_if(
            &member.id,
            |s| s.run_sheet_id == Some(id) && s.can_transition_to(target),
            |s| s.set_status(target, now),
        );
        match outcome {
            UpdateOutcome::Updated(shipment) => {
                state.metrics.transition("shipment", true);
                dispatched.succeeded.push(shipment);
            }
            UpdateOutcome::NotModified(shipment) => {
                state.metrics.transition("shipment", false);
                dispatched.fail(
                    shipment.id,
                    format!("shipment {} is {}", shipment.awb, shipment.status),
                );
            }
            UpdateOutcome::NotFound => dispatched.fail(member.id, "shipment not found"),
        }
    }

    info!(
        run_sheet_id = %id,
        dispatched = dispatched.succeeded.len(),
        skipped = dispatched.failed.len(),
        "run sheet scanned out"
    );
    state
        .metrics
        .batch("scan_out", dispatched.succeeded.len(), dispatched.failed.len());

    Ok(ScanOutReport {
        run_sheet,
        dispatched,
    })
}

/// One-way inbound gate; requires a prior scan-out. Shipment statuses are
/// left alone.
pub fn scan_in(state: &AppState, id: Uuid) -> Result<RunSheet, AppError> {
    let now = Utc::now();
    match state.run_sheets.update_if(
        &id,
        |r| r.is_scanned_out && !r.is_scanned_in,
        |r| {
            r.is_scanned_in = true;
            r.scanned_in_at = Some(now);
        },
    ) {
        UpdateOutcome::Updated(run_sheet) => {
            state.metrics.transition("run_sheet", true);
            info!(run_sheet_id = %id, "run sheet scanned in");
            Ok(run_sheet)
        }
        UpdateOutcome::NotModified(run_sheet) => {
            state.metrics.transition("run_sheet", false);
            let reason = if run_sheet.is_scanned_in {
                "is already scanned in"
            } else {
                "has not been scanned out"
            };
            Err(AppError::PreconditionFailed(format!("run sheet {id} {reason}")))
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("run sheet {id} not found"))),
    }
}

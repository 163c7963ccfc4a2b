use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::bins::release_slot;
use crate::engine::ledger::credit_delivery;
use crate::engine::shipments::{apply_delivery, parse_reschedule, vacate_bin};
use crate::error::AppError;
use crate::models::attempt::{AttemptOutcome, DeliveryAttempt};
use crate::models::shipment::{PaymentMethod, ProofBundle, Shipment, MAX_AMOUNT};
use crate::state::AppState;
use crate::store::UpdateOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct RecordAttemptRequest {
    pub shipment_id: Uuid,
    pub run_sheet_id: Uuid,
    pub outcome: AttemptOutcome,
    #[serde(default)]
    pub amount_collected: i64,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub reschedule_date: Option<String>,
    pub reschedule_time: Option<String>,
    pub proof: Option<ProofBundle>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttemptRecorded {
    pub attempt: DeliveryAttempt,
    pub shipment: Shipment,
}

/// Records one field visit. The acting courier is taken from the run sheet,
/// never from the caller. The shipment transition is applied first; the
/// attempt is persisted only if it succeeded.
pub fn record_attempt(state: &AppState, req: RecordAttemptRequest) -> Result<AttemptRecorded, AppError> {
    if !(0..=MAX_AMOUNT).contains(&req.amount_collected) {
        return Err(AppError::Validation(format!(
            "amount_collected must be between 0 and {MAX_AMOUNT}"
        )));
    }
    let today = Utc::now().date_naive();
    let reschedule = match (req.outcome, req.reschedule_date.as_deref()) {
        (AttemptOutcome::Rescheduled, Some(date)) => Some(parse_reschedule(
            date,
            req.reschedule_time.clone(),
            req.notes.clone(),
            today,
        )?),
        (AttemptOutcome::Rescheduled, None) => {
            return Err(AppError::Validation(
                "reschedule_date is required for a rescheduled attempt".to_string(),
            ));
        }
        _ => None,
    };
    let reschedule_date = reschedule.as_ref().map(|r| r.date.clone());

    state.shipments.require(&req.shipment_id, "shipment")?;
    let run_sheet = state.run_sheets.require(&req.run_sheet_id, "run sheet")?;
    let courier_id = run_sheet.courier_id;

    let target = req.outcome.target_status();
    let now = Utc::now();
    let proof = req.proof.clone().map(|mut p| {
        p.captured_at.get_or_insert(now);
        p
    });
    let shipment_proof = proof.clone();
    let mut vacated = None;
    let outcome = state.shipments.update_if(
        &req.shipment_id,
        |s| s.run_sheet_id == Some(run_sheet.id) && s.can_transition_to(target),
        |s| {
            match req.outcome {
                AttemptOutcome::Delivered => {
                    apply_delivery(s, Some(courier_id), shipment_proof, now)
                }
                AttemptOutcome::Rescheduled => s.reschedule = reschedule,
                AttemptOutcome::Cancelled | AttemptOutcome::NoResponse => {}
            }
            vacated = vacate_bin(s, target);
            s.set_status(target, now);
        },
    );
    if let Some(bin_id) = vacated {
        release_slot(state, bin_id);
    }

    let shipment = match outcome {
        UpdateOutcome::Updated(shipment) => shipment,
        UpdateOutcome::NotModified(shipment) => {
            state.metrics.transition("shipment", false);
            let reason = if shipment.run_sheet_id != Some(run_sheet.id) {
                format!("shipment {} is not on run sheet {}", shipment.awb, run_sheet.id)
            } else {
                format!(
                    "shipment {} is {}, cannot record {}",
                    shipment.awb,
                    shipment.status,
                    req.outcome.as_str()
                )
            };
            return Err(AppError::PreconditionFailed(reason));
        }
        UpdateOutcome::NotFound => {
            return Err(AppError::NotFound(format!(
                "shipment {} not found",
                req.shipment_id
            )));
        }
    };
    state.metrics.transition("shipment", true);

    let attempt = state.delivery_attempts.insert(DeliveryAttempt {
        id: Uuid::new_v4(),
        shipment_id: shipment.id,
        run_sheet_id: run_sheet.id,
        courier_id,
        outcome: req.outcome,
        amount_collected: req.amount_collected,
        payment_method: req.payment_method,
        notes: req.notes,
        reschedule_date,
        proof,
        created_at: now,
    })?;

    if req.outcome == AttemptOutcome::Delivered {
        credit_delivery(state, &shipment)?;
    }

    state
        .metrics
        .attempts_total
        .with_label_values(&[req.outcome.as_str()])
        .inc();
    info!(
        attempt_id = %attempt.id,
        shipment_id = %shipment.id,
        run_sheet_id = %run_sheet.id,
        courier_id = %courier_id,
        outcome = req.outcome.as_str(),
        "delivery attempt recorded"
    );

    Ok(AttemptRecorded { attempt, shipment })
}

pub fn list_attempts(state: &AppState, shipment_id: Uuid) -> Result<Vec<DeliveryAttempt>, AppError> {
    state.shipments.require(&shipment_id, "shipment")?;
    let mut attempts = state
        .delivery_attempts
        .find(|a| a.shipment_id == shipment_id);
    attempts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(attempts)
}

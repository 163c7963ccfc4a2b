//! Courier cash ledger.
//!
//! A courier is credited exactly once per shipment, at the moment the
//! shipment's guarded transition into a terminal-success status succeeds.
//! Reconciliation debits the same courier by the shipment's recorded COD
//! amount.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::shipment::{Shipment, MAX_AMOUNT};
use crate::state::AppState;
use crate::store::UpdateOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileRequest {
    pub amount_collected: i64,
    pub reconciliation_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CourierLedger {
    pub courier_id: Uuid,
    pub pending_cod: i64,
    pub total_deliveries: u32,
    pub unreconciled_total: i64,
    pub unreconciled: Vec<Shipment>,
}

/// Bumps the credited courier's delivery counter, plus `pending_cod` for COD
/// shipments. Call only after the shipment's own transition succeeded.
pub fn credit_delivery(state: &AppState, shipment: &Shipment) -> Result<(), AppError> {
    let Some(courier_id) = shipment.credited_courier_id else {
        return Ok(());
    };
    let amount = if shipment.is_cod { shipment.cod_amount } else { 0 };
    let now = Utc::now();

    let credited = state.couriers.update_if(
        &courier_id,
        |courier| courier.pending_cod.checked_add(amount).is_some(),
        |courier| {
            courier.total_deliveries = courier.total_deliveries.saturating_add(1);
            courier.pending_cod += amount;
            courier.updated_at = now;
        },
    );

    match credited {
        UpdateOutcome::Updated(courier) => {
            if amount > 0 {
                state.metrics.cod_credited_total.inc_by(amount as u64);
            }
            info!(
                courier_id = %courier_id,
                shipment_id = %shipment.id,
                amount,
                pending_cod = courier.pending_cod,
                "courier credited"
            );
            Ok(())
        }
        UpdateOutcome::NotModified(courier) => {
            error!(
                courier_id = %courier_id,
                shipment_id = %shipment.id,
                amount,
                pending_cod = courier.pending_cod,
                "courier credit would overflow pending COD"
            );
            Err(AppError::Internal(format!(
                "pending COD of courier {courier_id} would overflow"
            )))
        }
        UpdateOutcome::NotFound => {
            warn!(
                courier_id = %courier_id,
                shipment_id = %shipment.id,
                "credited courier no longer exists"
            );
            Ok(())
        }
    }
}

pub fn reconcile(state: &AppState, id: Uuid, req: ReconcileRequest) -> Result<Shipment, AppError> {
    if !(0..=MAX_AMOUNT).contains(&req.amount_collected) {
        return Err(AppError::Validation(format!(
            "amount_collected must be between 0 and {MAX_AMOUNT}"
        )));
    }

    let now = Utc::now();
    let outcome = state.shipments.update_if(
        &id,
        |s| s.awaiting_reconciliation(),
        |s| {
            s.cod_reconciled = true;
            s.reconciled_at = Some(now);
            s.reconciliation_notes = req.reconciliation_notes;
            s.amount_reported = Some(req.amount_collected);
            let drift = req.amount_collected - s.cod_amount;
            s.reconciliation_discrepancy = (drift != 0).then_some(drift);
            s.touch(now);
        },
    );

    let shipment = match outcome {
        UpdateOutcome::Updated(shipment) => shipment,
        UpdateOutcome::NotModified(shipment) => {
            state.metrics.transition("reconciliation", false);
            let reason = if !shipment.is_cod {
                "is not COD"
            } else if !shipment.cod_collected {
                "has not had its COD collected"
            } else {
                "is already reconciled"
            };
            return Err(AppError::PreconditionFailed(format!(
                "shipment {} {reason}",
                shipment.awb
            )));
        }
        UpdateOutcome::NotFound => {
            return Err(AppError::NotFound(format!("shipment {id} not found")));
        }
    };
    state.metrics.transition("reconciliation", true);

    if let Some(drift) = shipment.reconciliation_discrepancy {
        warn!(
            shipment_id = %id,
            cod_amount = shipment.cod_amount,
            reported = req.amount_collected,
            drift,
            "reconciled amount differs from recorded COD"
        );
    }

    if let Some(courier_id) = shipment.credited_courier_id {
        let debited = state.couriers.update(&courier_id, |courier| {
            courier.pending_cod = courier.pending_cod.saturating_sub(shipment.cod_amount);
            courier.updated_at = now;
        });
        match debited {
            Some(courier) => info!(
                courier_id = %courier_id,
                shipment_id = %id,
                amount = shipment.cod_amount,
                pending_cod = courier.pending_cod,
                "courier debited on reconciliation"
            ),
            None => warn!(courier_id = %courier_id, "reconciled courier no longer exists"),
        }
    }
    state
        .metrics
        .cod_reconciled_total
        .inc_by(shipment.cod_amount as u64);

    Ok(shipment)
}

/// COD shipments collected in the field but not yet reconciled.
pub fn pending_reconciliation(state: &AppState) -> Vec<Shipment> {
    let mut shipments = state.shipments.find(Shipment::awaiting_reconciliation);
    shipments.sort_by(|a, b| a.delivered_at.cmp(&b.delivered_at));
    shipments
}

pub fn courier_ledger(state: &AppState, courier_id: Uuid) -> Result<CourierLedger, AppError> {
    let courier = state.couriers.require(&courier_id, "courier")?;
    let unreconciled: Vec<Shipment> = pending_reconciliation(state)
        .into_iter()
        .filter(|s| s.credited_courier_id == Some(courier_id))
        .collect();

    Ok(CourierLedger {
        courier_id,
        pending_cod: courier.pending_cod,
        total_deliveries: courier.total_deliveries,
        unreconciled_total: unreconciled
            .iter()
            .fold(0i64, |total, s| total.saturating_add(s.cod_amount)),
        unreconciled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::couriers::{create_courier, CreateCourierRequest};
    use crate::engine::shipments::{
        assign_courier, create_shipment, mark_delivered, CreateShipmentRequest,
    };
    use crate::models::shipment::{ShipmentType, Workflow};

    fn cod_shipment(state: &AppState, amount: i64) -> Shipment {
        create_shipment(
            state,
            CreateShipmentRequest {
                awb: None,
                workflow: Workflow::Direct,
                shipment_type: ShipmentType::Delivery,
                pickup_subtype: None,
                customer_name: "Meera".to_string(),
                customer_phone: "9123456780".to_string(),
                pickup_address: "Dock 4".to_string(),
                delivery_address: Some("7 Hill St".to_string()),
                package_description: Some("Electronics".to_string()),
                number_of_items: Some(1),
                weight: None,
                value: None,
                payment_method: None,
                is_cod: true,
                cod_amount: Some(amount),
            },
        )
        .unwrap()
    }

    fn courier(state: &AppState) -> Uuid {
        create_courier(
            state,
            CreateCourierRequest {
                name: "Kiran".to_string(),
                phone: "9000000001".to_string(),
                email: None,
                vehicle_number: "KA02".to_string(),
                vehicle_type: "van".to_string(),
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn delivery_then_reconciliation_restores_pending_cod() {
        let state = AppState::default();
        let courier_id = courier(&state);
        let shipment = cod_shipment(&state, 500);
        assign_courier(&state, shipment.id, courier_id).unwrap();

        let delivered = mark_delivered(&state, shipment.id, None).unwrap();
        assert!(delivered.cod_collected);
        let after_delivery = state.couriers.get(&courier_id).unwrap();
        assert_eq!(after_delivery.pending_cod, 500);
        assert_eq!(after_delivery.total_deliveries, 1);
        assert_eq!(pending_reconciliation(&state).len(), 1);

        let reconciled = reconcile(
            &state,
            shipment.id,
            ReconcileRequest {
                amount_collected: 500,
                reconciliation_notes: Some("cash counted".to_string()),
            },
        )
        .unwrap();
        assert!(reconciled.cod_reconciled);
        assert!(reconciled.reconciliation_discrepancy.is_none());
        assert_eq!(state.couriers.get(&courier_id).unwrap().pending_cod, 0);
        assert!(pending_reconciliation(&state).is_empty());
    }

    #[test]
    fn reconciling_uncollected_cod_is_rejected() {
        let state = AppState::default();
        let shipment = cod_shipment(&state, 300);
        let err = reconcile(
            &state,
            shipment.id,
            ReconcileRequest {
                amount_collected: 300,
                reconciliation_notes: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
        assert!(!state.shipments.get(&shipment.id).unwrap().cod_reconciled);
    }

    #[test]
    fn reported_amount_does_not_drift_the_ledger() {
        let state = AppState::default();
        let courier_id = courier(&state);
        let shipment = cod_shipment(&state, 500);
        assign_courier(&state, shipment.id, courier_id).unwrap();
        mark_delivered(&state, shipment.id, None).unwrap();

        let reconciled = reconcile(
            &state,
            shipment.id,
            ReconcileRequest {
                amount_collected: 450,
                reconciliation_notes: None,
            },
        )
        .unwrap();
        assert_eq!(reconciled.reconciliation_discrepancy, Some(-50));
        assert_eq!(reconciled.amount_reported, Some(450));
        assert_eq!(state.couriers.get(&courier_id).unwrap().pending_cod, 0);
    }

    #[test]
    fn second_reconciliation_is_rejected() {
        let state = AppState::default();
        let courier_id = courier(&state);
        let shipment = cod_shipment(&state, 200);
        assign_courier(&state, shipment.id, courier_id).unwrap();
        mark_delivered(&state, shipment.id, None).unwrap();

        let req = ReconcileRequest {
            amount_collected: 200,
            reconciliation_notes: None,
        };
        reconcile(&state, shipment.id, req.clone()).unwrap();
        assert!(matches!(
            reconcile(&state, shipment.id, req),
            Err(AppError::PreconditionFailed(_))
        ));
        assert_eq!(state.couriers.get(&courier_id).unwrap().pending_cod, 0);
    }

    #[test]
    fn credit_that_would_overflow_pending_cod_is_refused() {
        let state = AppState::default();
        let courier_id = courier(&state);
        state
            .couriers
            .update(&courier_id, |c| c.pending_cod = i64::MAX - 10);
        let shipment = cod_shipment(&state, 500);
        assign_courier(&state, shipment.id, courier_id).unwrap();

        let err = mark_delivered(&state, shipment.id, None).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let rider = state.couriers.get(&courier_id).unwrap();
        assert_eq!(rider.pending_cod, i64::MAX - 10);
        assert_eq!(rider.total_deliveries, 0);
    }

    #[test]
    fn reconcile_rejects_out_of_range_amounts() {
        let state = AppState::default();
        let shipment = cod_shipment(&state, 300);
        for amount in [-1, MAX_AMOUNT + 1] {
            let err = reconcile(
                &state,
                shipment.id,
                ReconcileRequest {
                    amount_collected: amount,
                    reconciliation_notes: None,
                },
            )
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[test]
    fn courier_ledger_lists_unreconciled_shipments() {
        let state = AppState::default();
        let courier_id = courier(&state);
        for amount in [100, 250] {
            let shipment = cod_shipment(&state, amount);
            assign_courier(&state, shipment.id, courier_id).unwrap();
            mark_delivered(&state, shipment.id, None).unwrap();
        }

        let ledger = courier_ledger(&state, courier_id).unwrap();
        assert_eq!(ledger.pending_cod, 350);
        assert_eq!(ledger.unreconciled_total, 350);
        assert_eq!(ledger.unreconciled.len(), 2);
    }
}

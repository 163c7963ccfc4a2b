//! Read-only projections over current store contents, recomputed per call.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::courier::CourierStatus;
use crate::models::pickup::PickupStatus;
use crate::models::shipment::{PaymentMethod, ShipmentStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DashboardStats {
    pub total_shipments: usize,
    pub counts_by_status: BTreeMap<ShipmentStatus, usize>,
    pub pending: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub total_couriers: usize,
    pub active_couriers: usize,
    pub total_cod_amount: i64,
    pub pending_cod_amount: i64,
    pub reconciled_cod_amount: i64,
    pub value_by_payment_method: BTreeMap<PaymentMethod, i64>,
    pub total_pickups: usize,
    pub pickups_by_status: BTreeMap<PickupStatus, usize>,
    pub pickup_collected_value: i64,
}

fn is_pending(status: ShipmentStatus) -> bool {
    matches!(status, ShipmentStatus::Pending | ShipmentStatus::PendingHandover)
}

fn is_in_transit(status: ShipmentStatus) -> bool {
    matches!(
        status,
        ShipmentStatus::Assigned
            | ShipmentStatus::InScanned
            | ShipmentStatus::AssignedToBin
            | ShipmentStatus::AssignedToChamp
            | ShipmentStatus::OutForDelivery
    )
}

/// Money sums saturate at `i64::MAX` rather than wrap.
pub fn compute_stats(state: &AppState) -> DashboardStats {
    let mut stats = DashboardStats::default();

    for shipment in state.shipments.all() {
        stats.total_shipments += 1;
        *stats.counts_by_status.entry(shipment.status).or_default() += 1;

        if is_pending(shipment.status) {
            stats.pending += 1;
        } else if is_in_transit(shipment.status) {
            stats.in_transit += 1;
        } else if shipment.status.is_terminal_success() {
            stats.delivered += 1;
        }

        if shipment.is_cod {
            let amount = shipment.cod_amount;
            stats.total_cod_amount = stats.total_cod_amount.saturating_add(amount);
            if shipment.cod_reconciled {
                stats.reconciled_cod_amount = stats.reconciled_cod_amount.saturating_add(amount);
            } else if shipment.cod_collected {
                stats.pending_cod_amount = stats.pending_cod_amount.saturating_add(amount);
            }
        }

        let by_method = stats
            .value_by_payment_method
            .entry(shipment.payment_method)
            .or_default();
        *by_method = by_method.saturating_add(shipment.value);
    }

    stats.total_couriers = state.couriers.len();
    stats.active_couriers = state
        .couriers
        .count(|c| c.status == CourierStatus::Active);

    for pickup in state.pickups.all() {
        stats.total_pickups += 1;
        *stats.pickups_by_status.entry(pickup.status).or_default() += 1;
        stats.pickup_collected_value = stats
            .pickup_collected_value
            .saturating_add(pickup.collected_value);
    }

    stats
}

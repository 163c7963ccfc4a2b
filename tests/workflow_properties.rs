//! Property-based tests for the shipment and pickup workflows.
//!
//! Random operation sequences are thrown at a small fleet of shipments. Most
//! operations are rejected by their guards; the properties only care that
//! whatever does get applied follows the transition table and keeps the COD
//! flags consistent.

use chrono::{Days, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use parcel_workflow::engine::attempts::{record_attempt, RecordAttemptRequest};
use parcel_workflow::engine::bins::{create_bin, CreateBinRequest};
use parcel_workflow::engine::couriers::{create_courier, CreateCourierRequest};
use parcel_workflow::engine::ledger::{reconcile, ReconcileRequest};
use parcel_workflow::engine::pickups::{
    complete_pickup, create_pickup, projection_matches_history, CompletePickupRequest,
    CreatePickupRequest,
};
use parcel_workflow::engine::run_sheets::{create_run_sheet, scan_out, CreateRunSheetRequest};
use parcel_workflow::engine::shipments::{
    assign_courier, assign_to_bin, assign_to_champ, create_shipment, in_scan, mark_delivered,
    mark_pickup_completed, reschedule, return_to_warehouse, unassign_courier, update_shipment,
    CreateShipmentRequest, RescheduleRequest, UpdateShipmentRequest,
};
use parcel_workflow::models::attempt::AttemptOutcome;
use parcel_workflow::models::pickup::{PickupStatus, PickupType, ShoppingItem};
use parcel_workflow::models::shipment::{
    PaymentMethod, Shipment, ShipmentStatus, ShipmentType, Workflow,
};
use parcel_workflow::state::AppState;

const FLEET: usize = 4;

const ALL_STATUSES: [ShipmentStatus; 13] = [
    ShipmentStatus::Pending,
    ShipmentStatus::Assigned,
    ShipmentStatus::Completed,
    ShipmentStatus::PendingHandover,
    ShipmentStatus::InScanned,
    ShipmentStatus::AssignedToBin,
    ShipmentStatus::AssignedToChamp,
    ShipmentStatus::OutForDelivery,
    ShipmentStatus::NoResponse,
    ShipmentStatus::ReturnedToWh,
    ShipmentStatus::Delivered,
    ShipmentStatus::Cancelled,
    ShipmentStatus::Rescheduled,
];

#[derive(Debug, Clone)]
enum Op {
    InScan(usize),
    AssignBin(Vec<usize>),
    AssignChamp(Vec<usize>),
    AssignCourier(usize),
    Unassign(usize),
    MarkDelivered(usize),
    MarkPickupCompleted(usize),
    Reschedule(usize),
    ReturnToWarehouse(Vec<usize>),
    SetStatus(usize, ShipmentStatus),
    CreateRunSheet(Vec<usize>),
    ScanOut(usize),
    Attempt(usize, usize, AttemptOutcome),
    Reconcile(usize, i64),
}

fn index() -> impl Strategy<Value = usize> {
    0..FLEET
}

fn indices() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(index(), 1..=FLEET)
}

fn outcome_strategy() -> impl Strategy<Value = AttemptOutcome> {
    prop_oneof![
        Just(AttemptOutcome::Delivered),
        Just(AttemptOutcome::Cancelled),
        Just(AttemptOutcome::NoResponse),
        Just(AttemptOutcome::Rescheduled),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        index().prop_map(Op::InScan),
        indices().prop_map(Op::AssignBin),
        indices().prop_map(Op::AssignChamp),
        index().prop_map(Op::AssignCourier),
        index().prop_map(Op::Unassign),
        index().prop_map(Op::MarkDelivered),
        index().prop_map(Op::MarkPickupCompleted),
        index().prop_map(Op::Reschedule),
        indices().prop_map(Op::ReturnToWarehouse),
        (index(), prop::sample::select(ALL_STATUSES.to_vec()))
            .prop_map(|(i, status)| Op::SetStatus(i, status)),
        indices().prop_map(Op::CreateRunSheet),
        (0usize..4).prop_map(Op::ScanOut),
        (index(), 0usize..4, outcome_strategy()).prop_map(|(i, k, o)| Op::Attempt(i, k, o)),
        (index(), 0i64..1_000).prop_map(|(i, amount)| Op::Reconcile(i, amount)),
    ]
}

struct Fleet {
    state: AppState,
    courier_id: Uuid,
    bin_id: Uuid,
    shipments: Vec<Uuid>,
    run_sheets: Vec<Uuid>,
}

fn fleet() -> Fleet {
    let state = AppState::default();
    let courier_id = create_courier(
        &state,
        CreateCourierRequest {
            name: "Prop".to_string(),
            phone: "9000000900".to_string(),
            email: None,
            vehicle_number: "PP01".to_string(),
            vehicle_type: "bike".to_string(),
        },
    )
    .unwrap()
    .id;
    let bin_id = create_bin(
        &state,
        CreateBinRequest {
            code: "P-1".to_string(),
            route_tag: "prop".to_string(),
            capacity: 100,
        },
    )
    .unwrap()
    .id;

    let shipments = (0..FLEET)
        .map(|n| {
            let workflow = if n % 2 == 0 {
                Workflow::Sorted
            } else {
                Workflow::Direct
            };
            let shipment_type = if n == 3 {
                ShipmentType::Pickup
            } else {
                ShipmentType::Delivery
            };
            let is_cod = shipment_type == ShipmentType::Delivery && n != 2;
            create_shipment(
                &state,
                CreateShipmentRequest {
                    awb: None,
                    workflow,
                    shipment_type,
                    pickup_subtype: None,
                    customer_name: format!("Customer {n}"),
                    customer_phone: "9000000901".to_string(),
                    pickup_address: "Hub".to_string(),
                    delivery_address: Some("Street".to_string()),
                    package_description: None,
                    number_of_items: None,
                    weight: None,
                    value: Some(300),
                    payment_method: None,
                    is_cod,
                    cod_amount: is_cod.then_some(200),
                },
            )
            .unwrap()
            .id
        })
        .collect();

    Fleet {
        state,
        courier_id,
        bin_id,
        shipments,
        run_sheets: Vec::new(),
    }
}

fn apply(fleet: &mut Fleet, op: &Op) {
    let state = &fleet.state;
    let pick = |i: &usize| fleet.shipments[*i];
    let many = |is: &[usize]| is.iter().map(pick).collect::<Vec<_>>();
    let tomorrow = (Utc::now().date_naive() + Days::new(1)).to_string();

    // Rejections are expected; only the resulting state is checked.
    match op {
        Op::InScan(i) => {
            if let Some(s) = state.shipments.get(&pick(i)) {
                let _ = in_scan(state, &s.awb);
            }
        }
        Op::AssignBin(is) => {
            let _ = assign_to_bin(state, &many(is.as_slice()), fleet.bin_id);
        }
        Op::AssignChamp(is) => {
            let _ = assign_to_champ(state, &many(is.as_slice()), fleet.courier_id);
        }
        Op::AssignCourier(i) => {
            let _ = assign_courier(state, pick(i), fleet.courier_id);
        }
        Op::Unassign(i) => {
            let _ = unassign_courier(state, pick(i));
        }
        Op::MarkDelivered(i) => {
            let _ = mark_delivered(state, pick(i), None);
        }
        Op::MarkPickupCompleted(i) => {
            let _ = mark_pickup_completed(state, pick(i), None);
        }
        Op::Reschedule(i) => {
            let _ = reschedule(
                state,
                pick(i),
                RescheduleRequest {
                    reschedule_date: tomorrow,
                    reschedule_time: None,
                    reason: None,
                },
            );
        }
        Op::ReturnToWarehouse(is) => {
            let _ = return_to_warehouse(state, &many(is.as_slice()));
        }
        Op::SetStatus(i, status) => {
            let _ = update_shipment(
                state,
                pick(i),
                UpdateShipmentRequest {
                    status: Some(*status),
                    ..Default::default()
                },
            );
        }
        Op::CreateRunSheet(is) => {
            let created = create_run_sheet(
                state,
                CreateRunSheetRequest {
                    courier_id: fleet.courier_id,
                    shipment_ids: many(is.as_slice()),
                },
            );
            if let Ok(sheet) = created {
                fleet.run_sheets.push(sheet.id);
            }
        }
        Op::ScanOut(k) => {
            if !fleet.run_sheets.is_empty() {
                let id = fleet.run_sheets[k % fleet.run_sheets.len()];
                let _ = scan_out(state, id);
            }
        }
        Op::Attempt(i, k, outcome) => {
            if !fleet.run_sheets.is_empty() {
                let run_sheet_id = fleet.run_sheets[k % fleet.run_sheets.len()];
                let _ = record_attempt(
                    state,
                    RecordAttemptRequest {
                        shipment_id: pick(i),
                        run_sheet_id,
                        outcome: *outcome,
                        amount_collected: 0,
                        payment_method: None,
                        notes: None,
                        reschedule_date: Some(tomorrow),
                        reschedule_time: None,
                        proof: None,
                    },
                );
            }
        }
        Op::Reconcile(i, amount) => {
            let _ = reconcile(
                state,
                pick(i),
                ReconcileRequest {
                    amount_collected: *amount,
                    reconciliation_notes: None,
                },
            );
        }
    }
}

fn snapshot(fleet: &Fleet) -> Vec<Shipment> {
    fleet
        .shipments
        .iter()
        .map(|id| fleet.state.shipments.get(id).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn random_operations_never_take_an_illegal_edge(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let mut fleet = fleet();
        let mut before = snapshot(&fleet);

        for op in &ops {
            apply(&mut fleet, op);
            let after = snapshot(&fleet);

            for (old, new) in before.iter().zip(&after) {
                if old.status != new.status {
                    prop_assert!(
                        old.status.can_transition_to(old.workflow, new.status),
                        "{:?} moved {} -> {} via {:?}",
                        old.workflow, old.status, new.status, op
                    );
                }
                prop_assert!(!new.cod_reconciled || new.cod_collected);
                prop_assert!(!new.cod_collected || (new.is_cod && new.status.is_terminal_success()));
                prop_assert!(new.updated_at >= old.updated_at);
                prop_assert!(new.bin_id.is_none() || new.status == ShipmentStatus::AssignedToBin);
            }
            let binned = after.iter().filter(|s| s.bin_id == Some(fleet.bin_id)).count();
            let bin = fleet.state.bin_locations.get(&fleet.bin_id).unwrap();
            prop_assert_eq!(bin.current_count as usize, binned);
            before = after;
        }

        let credited: i64 = before
            .iter()
            .filter(|s| s.cod_collected && !s.cod_reconciled)
            .filter(|s| s.credited_courier_id == Some(fleet.courier_id))
            .map(|s| s.cod_amount)
            .sum();
        let courier = fleet.state.couriers.get(&fleet.courier_id).unwrap();
        prop_assert_eq!(courier.pending_cod, credited);
    }

    #[test]
    fn run_sheet_totals_follow_declared_values(
        lines in prop::collection::vec((0i64..100_000, 1i64..100_000, 0u8..3), 1..8)
    ) {
        let fleet = fleet();
        let state = &fleet.state;
        let method_of = |m: u8| match m {
            0 => PaymentMethod::Cash,
            1 => PaymentMethod::Card,
            _ => PaymentMethod::Prepaid,
        };
        let ids: Vec<Uuid> = lines
            .iter()
            .map(|(value, cod_amount, m)| {
                let method = method_of(*m);
                let is_cod = method != PaymentMethod::Prepaid;
                let shipment = create_shipment(
                    state,
                    CreateShipmentRequest {
                        awb: None,
                        workflow: Workflow::Direct,
                        shipment_type: ShipmentType::Delivery,
                        pickup_subtype: None,
                        customer_name: "Sum".to_string(),
                        customer_phone: "9000000902".to_string(),
                        pickup_address: "Hub".to_string(),
                        delivery_address: Some("Street".to_string()),
                        package_description: None,
                        number_of_items: None,
                        weight: None,
                        value: Some(*value),
                        payment_method: Some(method),
                        is_cod,
                        cod_amount: is_cod.then_some(*cod_amount),
                    },
                )
                .unwrap();
                assign_courier(state, shipment.id, fleet.courier_id).unwrap();
                shipment.id
            })
            .collect();

        let sheet = create_run_sheet(
            state,
            CreateRunSheetRequest { courier_id: fleet.courier_id, shipment_ids: ids },
        )
        .unwrap();

        let sum_for = |wanted: Option<PaymentMethod>| -> i64 {
            lines
                .iter()
                .filter(|(_, _, m)| wanted.is_none_or(|w| method_of(*m) == w))
                .map(|(value, _, _)| value)
                .sum()
        };
        prop_assert_eq!(sheet.total_value, sum_for(None));
        prop_assert_eq!(sheet.cash_to_collect, sum_for(Some(PaymentMethod::Cash)));
        prop_assert_eq!(sheet.card_to_collect, sum_for(Some(PaymentMethod::Card)));
        prop_assert!(sheet.cash_to_collect + sheet.card_to_collect <= sheet.total_value);
    }

    #[test]
    fn shopping_projection_matches_delivered_items(
        values in prop::collection::vec(1i64..50_000, 1..6),
        events in prop::collection::vec(prop::collection::vec(0usize..6, 1..4), 1..6)
    ) {
        let state = AppState::default();
        let pickup = create_pickup(
            &state,
            CreatePickupRequest {
                pickup_type: PickupType::PersonalShopping,
                customer_name: "Shopper".to_string(),
                customer_phone: "9000000903".to_string(),
                address: "Mall".to_string(),
                category_items: Vec::new(),
                shopping_items: values
                    .iter()
                    .enumerate()
                    .map(|(n, value)| ShoppingItem {
                        name: format!("item {n}"),
                        value: *value,
                        is_delivered: false,
                    })
                    .collect(),
            },
        )
        .unwrap();

        let mut previous = pickup.status;
        for event in events {
            let event: Vec<usize> = event.into_iter().map(|i| i % values.len()).collect();
            let done = complete_pickup(
                &state,
                pickup.id,
                CompletePickupRequest { delivered_indices: event, proof: None },
            )
            .unwrap()
            .pickup;

            let delivered: i64 = done
                .shopping_items
                .iter()
                .filter(|item| item.is_delivered)
                .map(|item| item.value)
                .sum();
            prop_assert_eq!(done.collected_value, delivered);

            let expected = if delivered == done.total_value {
                PickupStatus::Completed
            } else if delivered > 0 {
                PickupStatus::Partial
            } else {
                previous
            };
            prop_assert_eq!(done.status, expected);
            prop_assert!(projection_matches_history(&state, pickup.id).unwrap());
            previous = done.status;
        }
    }
}

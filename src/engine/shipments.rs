use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::bins::release_slot;
use crate::engine::ledger::credit_delivery;
use crate::error::AppError;
use crate::models::batch::BatchReport;
use crate::models::courier::{Courier, CourierStatus};
use crate::models::shipment::{
    FollowUp, PaymentMethod, PickupSubtype, ProofBundle, Reschedule, Shipment, ShipmentStatus,
    ShipmentType, Workflow, MAX_AMOUNT,
};
use crate::state::AppState;
use crate::store::UpdateOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateShipmentRequest {
    pub awb: Option<String>,
    #[serde(default)]
    pub workflow: Workflow,
    pub shipment_type: ShipmentType,
    pub pickup_subtype: Option<PickupSubtype>,
    pub customer_name: String,
    pub customer_phone: String,
    pub pickup_address: String,
    pub delivery_address: Option<String>,
    pub package_description: Option<String>,
    pub number_of_items: Option<u32>,
    pub weight: Option<f64>,
    pub value: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub is_cod: bool,
    pub cod_amount: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateShipmentRequest {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub package_description: Option<String>,
    pub number_of_items: Option<u32>,
    pub weight: Option<f64>,
    pub value: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    pub is_cod: Option<bool>,
    pub cod_amount: Option<i64>,
    pub status: Option<ShipmentStatus>,
    pub courier_id: Option<Uuid>,
}

impl UpdateShipmentRequest {
    fn is_empty(&self) -> bool {
        self.customer_name.is_none()
            && self.customer_phone.is_none()
            && self.pickup_address.is_none()
            && self.delivery_address.is_none()
            && self.package_description.is_none()
            && self.number_of_items.is_none()
            && self.weight.is_none()
            && self.value.is_none()
            && self.payment_method.is_none()
            && self.is_cod.is_none()
            && self.cod_amount.is_none()
            && self.status.is_none()
            && self.courier_id.is_none()
    }

    fn touches_payment(&self) -> bool {
        self.value.is_some()
            || self.payment_method.is_some()
            || self.is_cod.is_some()
            || self.cod_amount.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub reschedule_date: String,
    pub reschedule_time: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpRequest {
    pub notes: String,
    pub follow_up_date: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    pub courier_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreatedRow {
    pub row: usize,
    pub id: Uuid,
    pub awb: String,
    pub customer_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowError {
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BulkImportReport {
    pub created_count: usize,
    pub error_count: usize,
    pub created: Vec<CreatedRow>,
    pub errors: Vec<RowError>,
}

struct Payment {
    value: i64,
    method: PaymentMethod,
    is_cod: bool,
    cod_amount: i64,
}

/// Pickup-origin shipments are never COD. For deliveries, a cash/card method
/// implies COD and a COD amount defaults to the declared value (and back).
fn resolve_payment(
    shipment_type: ShipmentType,
    is_cod: bool,
    method: Option<PaymentMethod>,
    value: Option<i64>,
    cod_amount: Option<i64>,
) -> Result<Payment, AppError> {
    if value.is_some_and(|v| v < 0) {
        return Err(AppError::Validation("value cannot be negative".to_string()));
    }
    if value.into_iter().chain(cod_amount).any(|amount| amount > MAX_AMOUNT) {
        return Err(AppError::Validation(format!(
            "amounts cannot exceed {MAX_AMOUNT}"
        )));
    }

    let collects = matches!(method, Some(PaymentMethod::Cash | PaymentMethod::Card));
    if shipment_type == ShipmentType::Pickup || !(is_cod || collects) {
        if collects && shipment_type == ShipmentType::Pickup {
            return Err(AppError::Validation(
                "pickup shipments cannot collect payment".to_string(),
            ));
        }
        return Ok(Payment {
            value: value.unwrap_or(0),
            method: PaymentMethod::Prepaid,
            is_cod: false,
            cod_amount: 0,
        });
    }

    let method = match method {
        None => PaymentMethod::Cash,
        Some(PaymentMethod::Prepaid) => {
            return Err(AppError::Validation(
                "a COD shipment cannot be prepaid".to_string(),
            ));
        }
        Some(method) => method,
    };
    let cod_amount = cod_amount.or(value).unwrap_or(0);
    if cod_amount <= 0 {
        return Err(AppError::Validation(
            "cod_amount must be > 0 for COD shipments".to_string(),
        ));
    }

    Ok(Payment {
        value: value.unwrap_or(cod_amount),
        method,
        is_cod: true,
        cod_amount,
    })
}

fn required(field: &str, raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional(field: &str, raw: Option<&str>) -> Result<Option<String>, AppError> {
    raw.map(|r| required(field, r)).transpose()
}

pub fn generate_awb(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("LT{}{}", now.format("%Y%m%d"), suffix)
}

fn build_shipment(req: CreateShipmentRequest, now: DateTime<Utc>) -> Result<Shipment, AppError> {
    let customer_name = required("customer_name", &req.customer_name)?;
    let customer_phone = required("customer_phone", &req.customer_phone)?;
    let pickup_address = required("pickup_address", &req.pickup_address)?;

    let delivery_address = match req.shipment_type {
        ShipmentType::Delivery => Some(required(
            "delivery_address",
            req.delivery_address.as_deref().unwrap_or_default(),
        )?),
        ShipmentType::Pickup => None,
    };

    let number_of_items = req.number_of_items.unwrap_or(1);
    if number_of_items == 0 {
        return Err(AppError::Validation("number_of_items must be > 0".to_string()));
    }
    if req.weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
        return Err(AppError::Validation("weight must be a non-negative number".to_string()));
    }

    let payment = resolve_payment(
        req.shipment_type,
        req.is_cod,
        req.payment_method,
        req.value,
        req.cod_amount,
    )?;

    let awb = match req.awb {
        Some(awb) => required("awb", &awb)?,
        None => generate_awb(now),
    };

    Ok(Shipment {
        id: Uuid::new_v4(),
        awb,
        workflow: req.workflow,
        shipment_type: req.shipment_type,
        pickup_subtype: match req.shipment_type {
            ShipmentType::Pickup => req.pickup_subtype,
            ShipmentType::Delivery => None,
        },
        customer_name,
        customer_phone,
        pickup_address,
        delivery_address,
        package_description: req
            .package_description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "Package".to_string()),
        number_of_items,
        weight: req.weight,
        value: payment.value,
        payment_method: payment.method,
        is_cod: payment.is_cod,
        cod_amount: payment.cod_amount,
        cod_collected: false,
        cod_reconciled: false,
        credited_courier_id: None,
        amount_reported: None,
        reconciliation_discrepancy: None,
        reconciliation_notes: None,
        reconciled_at: None,
        status: ShipmentStatus::initial(req.workflow),
        courier_id: None,
        courier_name: None,
        bin_id: None,
        run_sheet_id: None,
        proof: None,
        delivered_at: None,
        completed_at: None,
        reschedule: None,
        follow_ups: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

pub fn create_shipment(state: &AppState, req: CreateShipmentRequest) -> Result<Shipment, AppError> {
    let shipment = build_shipment(req, Utc::now())?;

    match state.awb_index.entry(shipment.awb.clone()) {
        Entry::Occupied(_) => {
            return Err(AppError::Validation(format!(
                "awb {} already exists",
                shipment.awb
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(shipment.id);
        }
    }

    if let Err(err) = state.shipments.insert(shipment.clone()) {
        state.awb_index.remove(&shipment.awb);
        return Err(err);
    }

    info!(
        shipment_id = %shipment.id,
        awb = %shipment.awb,
        workflow = ?shipment.workflow,
        status = %shipment.status,
        "shipment created"
    );
    Ok(shipment)
}

/// Creates one shipment per row; a bad row is reported and skipped.
pub fn bulk_create(state: &AppState, rows: Vec<Value>) -> BulkImportReport {
    let mut created = Vec::new();
    let mut errors = Vec::new();

    for (index, raw) in rows.into_iter().enumerate() {
        let row = index + 1;
        let result = serde_json::from_value::<CreateShipmentRequest>(raw)
            .map_err(|err| AppError::Validation(err.to_string()))
            .and_then(|req| create_shipment(state, req));

        match result {
            Ok(shipment) => created.push(CreatedRow {
                row,
                id: shipment.id,
                awb: shipment.awb,
                customer_name: shipment.customer_name,
            }),
            Err(err) => errors.push(RowError {
                row,
                error: err.to_string(),
            }),
        }
    }

    state.metrics.batch("bulk_create", created.len(), errors.len());
    info!(
        created = created.len(),
        errors = errors.len(),
        "bulk shipment import finished"
    );

    BulkImportReport {
        created_count: created.len(),
        error_count: errors.len(),
        created,
        errors,
    }
}

pub fn list_shipments(state: &AppState, filter: &ShipmentFilter) -> Vec<Shipment> {
    let mut shipments = state.shipments.find(|s| {
        filter.status.is_none_or(|status| s.status == status)
            && filter.courier_id.is_none_or(|id| s.courier_id == Some(id))
    });
    shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    shipments
}

pub fn get_shipment(state: &AppState, id: Uuid) -> Result<Shipment, AppError> {
    state.shipments.require(&id, "shipment")
}

pub fn get_by_awb(state: &AppState, awb: &str) -> Result<Shipment, AppError> {
    let id = state
        .awb_index
        .get(awb.trim())
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("awb {awb} not found")))?;
    get_shipment(state, id)
}

/// Refuses while collected COD is still on the courier's ledger; deleting
/// then would leave `pending_cod` with nothing to reconcile against.
pub fn delete_shipment(state: &AppState, id: Uuid) -> Result<Shipment, AppError> {
    let shipment = match state
        .shipments
        .remove_if(&id, |s| !s.awaiting_reconciliation())
    {
        UpdateOutcome::Updated(shipment) => shipment,
        UpdateOutcome::NotModified(shipment) => {
            return Err(AppError::PreconditionFailed(format!(
                "shipment {} has collected COD awaiting reconciliation",
                shipment.awb
            )));
        }
        UpdateOutcome::NotFound => {
            return Err(AppError::NotFound(format!("shipment {id} not found")));
        }
    };
    state.awb_index.remove(&shipment.awb);
    if let Some(bin_id) = shipment.bin_id {
        release_slot(state, bin_id);
    }
    info!(shipment_id = %id, awb = %shipment.awb, "shipment deleted");
    Ok(shipment)
}

fn rejected(shipment: &Shipment, target: ShipmentStatus) -> AppError {
    AppError::PreconditionFailed(format!(
        "shipment {} is {}, cannot move to {}",
        shipment.awb, shipment.status, target
    ))
}

/// A shipment holds its bin slot only while in `assigned_to_bin`.
pub(crate) fn vacate_bin(shipment: &mut Shipment, target: ShipmentStatus) -> Option<Uuid> {
    if shipment.status == ShipmentStatus::AssignedToBin && target != ShipmentStatus::AssignedToBin {
        shipment.bin_id.take()
    } else {
        None
    }
}

/// Single-document guarded transition. The guard always includes legality of
/// the edge; `extra` narrows it further.
fn transition<G, A>(
    state: &AppState,
    id: Uuid,
    target: ShipmentStatus,
    extra: G,
    apply: A,
) -> UpdateOutcome<Shipment>
where
    G: FnOnce(&Shipment) -> bool,
    A: FnOnce(&mut Shipment, DateTime<Utc>),
{
    let now = Utc::now();
    let mut vacated = None;
    let outcome = state.shipments.update_if(
        &id,
        |s| s.can_transition_to(target) && extra(s),
        |s| {
            apply(s, now);
            vacated = vacate_bin(s, target);
            s.set_status(target, now);
        },
    );
    if let Some(bin_id) = vacated {
        release_slot(state, bin_id);
    }

    match &outcome {
        UpdateOutcome::Updated(s) => {
            state.metrics.transition("shipment", true);
            info!(shipment_id = %id, awb = %s.awb, status = %target, "shipment transitioned");
        }
        UpdateOutcome::NotModified(s) => {
            state.metrics.transition("shipment", false);
            info!(
                shipment_id = %id,
                status = %s.status,
                target = %target,
                "shipment transition not applied"
            );
        }
        UpdateOutcome::NotFound => {}
    }
    outcome
}

fn single(outcome: UpdateOutcome<Shipment>, id: Uuid, target: ShipmentStatus) -> Result<Shipment, AppError> {
    match outcome {
        UpdateOutcome::Updated(shipment) => Ok(shipment),
        UpdateOutcome::NotModified(shipment) => Err(rejected(&shipment, target)),
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("shipment {id} not found"))),
    }
}

fn active_courier(state: &AppState, courier_id: Uuid) -> Result<Courier, AppError> {
    let courier = state.couriers.require(&courier_id, "courier")?;
    if courier.status != CourierStatus::Active {
        return Err(AppError::PreconditionFailed(format!(
            "courier {courier_id} is not active"
        )));
    }
    Ok(courier)
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

pub fn in_scan(state: &AppState, awb: &str) -> Result<Shipment, AppError> {
    let shipment = get_by_awb(state, awb)?;
    let target = ShipmentStatus::InScanned;
    single(transition(state, shipment.id, target, |_| true, |_, _| {}), shipment.id, target)
}

/// Moves every `in_scanned` shipment in `ids` into `bin_id`. Occupancy grows
/// by the number actually moved; with capacity enforcement a slot is reserved
/// before the move and handed back if the move does not happen.
pub fn assign_to_bin(
    state: &AppState,
    ids: &[Uuid],
    bin_id: Uuid,
) -> Result<BatchReport<Shipment>, AppError> {
    state.bin_locations.require(&bin_id, "bin location")?;
    let target = ShipmentStatus::AssignedToBin;
    let mut report = BatchReport::new();

    for id in dedup(ids) {
        if state.enforce_bin_capacity {
            let reserved = state.bin_locations.update_if(
                &bin_id,
                |bin| bin.has_room(),
                |bin| bin.current_count += 1,
            );
            if !matches!(reserved, UpdateOutcome::Updated(_)) {
                report.fail(id, format!("bin {bin_id} is at capacity"));
                continue;
            }
        }

        let outcome = transition(state, id, target, |_| true, |s, _| s.bin_id = Some(bin_id));
        let moved = matches!(outcome, UpdateOutcome::Updated(_));
        match outcome {
            UpdateOutcome::Updated(shipment) => report.succeeded.push(shipment),
            UpdateOutcome::NotModified(shipment) => {
                report.fail(id, rejected(&shipment, target).to_string())
            }
            UpdateOutcome::NotFound => report.fail(id, "shipment not found"),
        }

        match (state.enforce_bin_capacity, moved) {
            (true, false) => release_slot(state, bin_id),
            (false, true) => {
                state
                    .bin_locations
                    .update(&bin_id, |bin| bin.current_count = bin.current_count.saturating_add(1));
            }
            _ => {}
        }
    }

    if let Some(bin) = state
        .bin_locations
        .update(&bin_id, |b| b.updated_at = Utc::now())
    {
        info!(
            bin_id = %bin_id,
            moved = report.succeeded.len(),
            rejected = report.failed.len(),
            occupancy = bin.current_count,
            capacity = bin.capacity,
            "assign to bin finished"
        );
    }
    state
        .metrics
        .batch("assign_to_bin", report.succeeded.len(), report.failed.len());
    Ok(report)
}

pub fn assign_to_champ(
    state: &AppState,
    ids: &[Uuid],
    courier_id: Uuid,
) -> Result<BatchReport<Shipment>, AppError> {
    let courier = active_courier(state, courier_id)?;
    let target = ShipmentStatus::AssignedToChamp;
    let mut report = BatchReport::new();

    for id in dedup(ids) {
        let outcome = transition(
            state,
            id,
            target,
            |_| true,
            |s, _| {
                s.courier_id = Some(courier.id);
                s.courier_name = Some(courier.name.clone());
            },
        );
        match outcome {
            UpdateOutcome::Updated(shipment) => report.succeeded.push(shipment),
            UpdateOutcome::NotModified(shipment) => {
                report.fail(id, rejected(&shipment, target).to_string())
            }
            UpdateOutcome::NotFound => report.fail(id, "shipment not found"),
        }
    }

    info!(
        courier_id = %courier_id,
        assigned = report.succeeded.len(),
        rejected = report.failed.len(),
        "assign to champ finished"
    );
    state
        .metrics
        .batch("assign_to_champ", report.succeeded.len(), report.failed.len());
    Ok(report)
}

pub fn return_to_warehouse(state: &AppState, ids: &[Uuid]) -> BatchReport<Shipment> {
    let target = ShipmentStatus::ReturnedToWh;
    let mut report = BatchReport::new();

    for id in dedup(ids) {
        let outcome = transition(
            state,
            id,
            target,
            |s| matches!(s.status, ShipmentStatus::Cancelled | ShipmentStatus::NoResponse),
            |s, _| {
                s.courier_id = None;
                s.courier_name = None;
                s.run_sheet_id = None;
            },
        );
        match outcome {
            UpdateOutcome::Updated(shipment) => report.succeeded.push(shipment),
            UpdateOutcome::NotModified(shipment) => {
                report.fail(id, rejected(&shipment, target).to_string())
            }
            UpdateOutcome::NotFound => report.fail(id, "shipment not found"),
        }
    }

    state
        .metrics
        .batch("return_to_warehouse", report.succeeded.len(), report.failed.len());
    report
}

pub fn assign_courier(state: &AppState, id: Uuid, courier_id: Uuid) -> Result<Shipment, AppError> {
    let courier = active_courier(state, courier_id)?;
    let target = ShipmentStatus::Assigned;
    let outcome = transition(
        state,
        id,
        target,
        |_| true,
        |s, _| {
            s.courier_id = Some(courier.id);
            s.courier_name = Some(courier.name);
        },
    );
    single(outcome, id, target)
}

pub fn unassign_courier(state: &AppState, id: Uuid) -> Result<Shipment, AppError> {
    let target = ShipmentStatus::Pending;
    let outcome = transition(
        state,
        id,
        target,
        |_| true,
        |s, _| {
            s.courier_id = None;
            s.courier_name = None;
        },
    );
    single(outcome, id, target)
}

fn stamp_proof(proof: Option<ProofBundle>, now: DateTime<Utc>) -> Option<ProofBundle> {
    proof.map(|mut p| {
        p.captured_at.get_or_insert(now);
        p
    })
}

/// Field changes that accompany a successful delivery. `credited` is the
/// courier whose ledger is credited for this shipment.
pub(crate) fn apply_delivery(
    shipment: &mut Shipment,
    credited: Option<Uuid>,
    proof: Option<ProofBundle>,
    now: DateTime<Utc>,
) {
    shipment.delivered_at = Some(now);
    shipment.completed_at = Some(now);
    shipment.credited_courier_id = credited;
    if shipment.is_cod {
        shipment.cod_collected = true;
    }
    if let Some(proof) = stamp_proof(proof, now) {
        shipment.proof = Some(proof);
    }
}

/// Terminal success for a delivery shipment. Repeating it on an already
/// delivered shipment returns the shipment unchanged and credits nothing.
pub fn mark_delivered(
    state: &AppState,
    id: Uuid,
    proof: Option<ProofBundle>,
) -> Result<Shipment, AppError> {
    let current = get_shipment(state, id)?;
    if current.shipment_type != ShipmentType::Delivery {
        return Err(AppError::Validation(
            "this action is only for delivery shipments".to_string(),
        ));
    }

    let target = ShipmentStatus::Delivered;
    let outcome = transition(
        state,
        id,
        target,
        |_| true,
        |s, now| {
            let credited = s.courier_id;
            apply_delivery(s, credited, proof, now);
        },
    );

    match outcome {
        UpdateOutcome::Updated(shipment) => {
            credit_delivery(state, &shipment)?;
            Ok(shipment)
        }
        UpdateOutcome::NotModified(shipment) if shipment.status == target => Ok(shipment),
        other => single(other, id, target),
    }
}

pub fn mark_pickup_completed(
    state: &AppState,
    id: Uuid,
    proof: Option<ProofBundle>,
) -> Result<Shipment, AppError> {
    let current = get_shipment(state, id)?;
    if current.shipment_type != ShipmentType::Pickup {
        return Err(AppError::Validation(
            "this action is only for pickup shipments".to_string(),
        ));
    }

    let target = ShipmentStatus::Completed;
    let outcome = transition(
        state,
        id,
        target,
        |_| true,
        |s, now| {
            s.completed_at = Some(now);
            s.credited_courier_id = s.courier_id;
            if let Some(proof) = stamp_proof(proof, now) {
                s.proof = Some(proof);
            }
        },
    );

    match outcome {
        UpdateOutcome::Updated(shipment) => {
            credit_delivery(state, &shipment)?;
            Ok(shipment)
        }
        UpdateOutcome::NotModified(shipment) if shipment.status == target => Ok(shipment),
        other => single(other, id, target),
    }
}

pub(crate) fn parse_reschedule(
    date: &str,
    time: Option<String>,
    reason: Option<String>,
    today: NaiveDate,
) -> Result<Reschedule, AppError> {
    let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|err| {
        AppError::Validation(format!("invalid reschedule date {date:?}: {err}"))
    })?;
    if parsed < today {
        return Err(AppError::Validation(format!(
            "reschedule date {parsed} is in the past"
        )));
    }
    Ok(Reschedule {
        date: parsed.to_string(),
        time,
        reason,
    })
}

pub fn reschedule(state: &AppState, id: Uuid, req: RescheduleRequest) -> Result<Shipment, AppError> {
    let plan = parse_reschedule(
        &req.reschedule_date,
        req.reschedule_time,
        req.reason,
        Utc::now().date_naive(),
    )?;

    let target = ShipmentStatus::Rescheduled;
    let outcome = transition(state, id, target, |_| true, |s, _| s.reschedule = Some(plan));
    single(outcome, id, target)
}

pub fn add_follow_up(state: &AppState, id: Uuid, req: FollowUpRequest) -> Result<Shipment, AppError> {
    let notes = required("notes", &req.notes)?;
    let now = Utc::now();
    let follow_up = FollowUp {
        id: Uuid::new_v4(),
        notes,
        follow_up_date: req.follow_up_date,
        created_by: req
            .author
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "system".to_string()),
        created_at: now,
    };

    state
        .shipments
        .update(&id, |s| {
            s.follow_ups.push(follow_up);
            s.touch(now);
        })
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))
}

/// Free-form edit. Does not change status unless `status` is given (must be
/// a legal edge, and not a terminal success) or a courier is set without a
/// status, which implies the workflow's assigned state when that edge is
/// legal. Payment fields are frozen once COD has been collected.
pub fn update_shipment(
    state: &AppState,
    id: Uuid,
    req: UpdateShipmentRequest,
) -> Result<Shipment, AppError> {
    if req.is_empty() {
        return Err(AppError::Validation("no update data provided".to_string()));
    }
    if req.status.is_some_and(ShipmentStatus::is_terminal_success) {
        return Err(AppError::Validation(
            "use mark-delivered or pickup-completed for terminal success".to_string(),
        ));
    }

    if req.number_of_items == Some(0) {
        return Err(AppError::Validation("number_of_items must be > 0".to_string()));
    }
    if req.weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
        return Err(AppError::Validation("weight must be a non-negative number".to_string()));
    }

    let snapshot = get_shipment(state, id)?;

    if req.touches_payment() && snapshot.cod_collected {
        return Err(AppError::PreconditionFailed(format!(
            "shipment {} has collected COD; payment fields are frozen",
            snapshot.awb
        )));
    }

    let payment = if req.touches_payment() {
        Some(resolve_payment(
            snapshot.shipment_type,
            req.is_cod.unwrap_or(snapshot.is_cod),
            req.payment_method.or(match req.is_cod {
                Some(false) => None,
                _ if snapshot.payment_method == PaymentMethod::Prepaid => None,
                _ => Some(snapshot.payment_method),
            }),
            req.value.or(Some(snapshot.value)),
            req.cod_amount.or(Some(snapshot.cod_amount).filter(|c| *c > 0)),
        )?)
    } else {
        None
    };

    let courier = match req.courier_id {
        Some(courier_id) => Some(state.couriers.require(&courier_id, "courier")?),
        None => None,
    };

    let target = match (req.status, &courier) {
        (Some(status), _) => {
            if status != snapshot.status && !snapshot.can_transition_to(status) {
                return Err(rejected(&snapshot, status));
            }
            Some(status)
        }
        (None, Some(_)) => {
            let implied = match snapshot.workflow {
                Workflow::Direct => ShipmentStatus::Assigned,
                Workflow::Sorted => ShipmentStatus::AssignedToChamp,
            };
            snapshot.can_transition_to(implied).then_some(implied)
        }
        (None, None) => None,
    };

    let customer_name = optional("customer_name", req.customer_name.as_deref())?;
    let customer_phone = optional("customer_phone", req.customer_phone.as_deref())?;
    let pickup_address = optional("pickup_address", req.pickup_address.as_deref())?;
    let package_description =
        optional("package_description", req.package_description.as_deref())?;

    let expected_status = snapshot.status;
    let expected_collected = snapshot.cod_collected;
    let now = Utc::now();
    let mut vacated = None;

    let outcome = state.shipments.update_if(
        &id,
        |s| s.status == expected_status && s.cod_collected == expected_collected,
        |s| {
            if let Some(v) = customer_name {
                s.customer_name = v;
            }
            if let Some(v) = customer_phone {
                s.customer_phone = v;
            }
            if let Some(v) = pickup_address {
                s.pickup_address = v;
            }
            if let Some(v) = package_description {
                s.package_description = v;
            }
            if let Some(v) = req.delivery_address {
                s.delivery_address = Some(v);
            }
            if let Some(v) = req.number_of_items {
                s.number_of_items = v;
            }
            if let Some(v) = req.weight {
                s.weight = Some(v);
            }
            if let Some(p) = payment {
                s.value = p.value;
                s.payment_method = p.method;
                s.is_cod = p.is_cod;
                s.cod_amount = p.cod_amount;
            }
            if let Some(c) = courier {
                s.courier_id = Some(c.id);
                s.courier_name = Some(c.name);
            }
            match target {
                Some(status) => {
                    vacated = vacate_bin(s, status);
                    s.set_status(status, now);
                }
                None => s.touch(now),
            }
        },
    );
    if let Some(bin_id) = vacated {
        release_slot(state, bin_id);
    }

    match outcome {
        UpdateOutcome::Updated(shipment) => {
            info!(shipment_id = %id, status = %shipment.status, "shipment updated");
            Ok(shipment)
        }
        UpdateOutcome::NotModified(current) => {
            warn!(shipment_id = %id, "shipment changed during update");
            Err(AppError::PreconditionFailed(format!(
                "shipment {} was modified concurrently (now {})",
                current.awb, current.status
            )))
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("shipment {id} not found"))),
    }
}

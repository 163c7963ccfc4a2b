use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Document;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentType {
    Delivery,
    Pickup,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PickupSubtype {
    CustomerReturn,
    Pickup,
}

/// Which lifecycle a shipment follows.
///
/// `Direct` shipments go straight from creation to a courier and out
/// (`pending -> assigned -> delivered|completed`). `Sorted` shipments pass
/// through the warehouse: hand-over, in-scan, bin, courier, run sheet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    #[default]
    Direct,
    Sorted,
}

/// Largest single money amount accepted, in minor units. Sums of bounded
/// amounts still go through checked arithmetic.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Prepaid,
    Cash,
    Card,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    // direct lifecycle
    Pending,
    Assigned,
    Completed,
    // sorted lifecycle
    PendingHandover,
    InScanned,
    AssignedToBin,
    AssignedToChamp,
    OutForDelivery,
    NoResponse,
    ReturnedToWh,
    // shared
    Delivered,
    Cancelled,
    Rescheduled,
}

use ShipmentStatus::*;

const DIRECT_PENDING: &[ShipmentStatus] = &[Assigned, Delivered, Completed, Rescheduled, Cancelled];
const DIRECT_ASSIGNED: &[ShipmentStatus] = &[
    Pending,
    Assigned,
    Delivered,
    Completed,
    Rescheduled,
    Cancelled,
];
const DIRECT_RESCHEDULED: &[ShipmentStatus] = &[
    Pending,
    Assigned,
    Delivered,
    Completed,
    Rescheduled,
    Cancelled,
];

const SORTED_PENDING_HANDOVER: &[ShipmentStatus] = &[InScanned, Rescheduled];
const SORTED_IN_SCANNED: &[ShipmentStatus] = &[AssignedToBin, Rescheduled];
const SORTED_ASSIGNED_TO_BIN: &[ShipmentStatus] = &[AssignedToChamp, Rescheduled];
const SORTED_ASSIGNED_TO_CHAMP: &[ShipmentStatus] = &[OutForDelivery, Rescheduled];
const SORTED_OUT_FOR_DELIVERY: &[ShipmentStatus] =
    &[Delivered, Completed, Cancelled, NoResponse, Rescheduled];
const SORTED_FAILED_ATTEMPT: &[ShipmentStatus] = &[ReturnedToWh, Rescheduled];
const SORTED_RESCHEDULED: &[ShipmentStatus] = &[AssignedToChamp, ReturnedToWh, Rescheduled];
const SORTED_RETURNED_TO_WH: &[ShipmentStatus] = &[AssignedToChamp, Rescheduled];

const NONE: &[ShipmentStatus] = &[];

impl ShipmentStatus {
    /// The legal successor set of `self` under `workflow`. Statuses that do
    /// not belong to the workflow have no successors.
    pub fn successors(self, workflow: Workflow) -> &'static [ShipmentStatus] {
        match (workflow, self) {
            (Workflow::Direct, Pending) => DIRECT_PENDING,
            (Workflow::Direct, Assigned) => DIRECT_ASSIGNED,
            (Workflow::Direct, Rescheduled) => DIRECT_RESCHEDULED,

            (Workflow::Sorted, PendingHandover) => SORTED_PENDING_HANDOVER,
            (Workflow::Sorted, InScanned) => SORTED_IN_SCANNED,
            (Workflow::Sorted, AssignedToBin) => SORTED_ASSIGNED_TO_BIN,
            (Workflow::Sorted, AssignedToChamp) => SORTED_ASSIGNED_TO_CHAMP,
            (Workflow::Sorted, OutForDelivery) => SORTED_OUT_FOR_DELIVERY,
            (Workflow::Sorted, Cancelled | NoResponse) => SORTED_FAILED_ATTEMPT,
            (Workflow::Sorted, Rescheduled) => SORTED_RESCHEDULED,
            (Workflow::Sorted, ReturnedToWh) => SORTED_RETURNED_TO_WH,

            _ => NONE,
        }
    }

    pub fn can_transition_to(self, workflow: Workflow, next: ShipmentStatus) -> bool {
        self.successors(workflow).contains(&next)
    }

    pub fn is_terminal(self, workflow: Workflow) -> bool {
        self.successors(workflow).is_empty()
    }

    pub fn is_terminal_success(self) -> bool {
        matches!(self, Delivered | Completed)
    }

    pub fn initial(workflow: Workflow) -> Self {
        match workflow {
            Workflow::Direct => Pending,
            Workflow::Sorted => PendingHandover,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pending => "pending",
            Assigned => "assigned",
            Completed => "completed",
            PendingHandover => "pending_handover",
            InScanned => "in_scanned",
            AssignedToBin => "assigned_to_bin",
            AssignedToChamp => "assigned_to_champ",
            OutForDelivery => "out_for_delivery",
            NoResponse => "no_response",
            ReturnedToWh => "returned_to_wh",
            Delivered => "delivered",
            Cancelled => "cancelled",
            Rescheduled => "rescheduled",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProofBundle {
    pub image_ref: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reschedule {
    pub date: String,
    pub time: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowUp {
    pub id: Uuid,
    pub notes: String,
    pub follow_up_date: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: Uuid,
    pub awb: String,
    pub workflow: Workflow,
    pub shipment_type: ShipmentType,
    pub pickup_subtype: Option<PickupSubtype>,
    pub customer_name: String,
    pub customer_phone: String,
    pub pickup_address: String,
    pub delivery_address: Option<String>,
    pub package_description: String,
    pub number_of_items: u32,
    pub weight: Option<f64>,
    pub value: i64,
    pub payment_method: PaymentMethod,
    pub is_cod: bool,
    pub cod_amount: i64,
    pub cod_collected: bool,
    pub cod_reconciled: bool,
    pub credited_courier_id: Option<Uuid>,
    pub amount_reported: Option<i64>,
    pub reconciliation_discrepancy: Option<i64>,
    pub reconciliation_notes: Option<String>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub status: ShipmentStatus,
    pub courier_id: Option<Uuid>,
    pub courier_name: Option<String>,
    pub bin_id: Option<Uuid>,
    pub run_sheet_id: Option<Uuid>,
    pub proof: Option<ProofBundle>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reschedule: Option<Reschedule>,
    pub follow_ups: Vec<FollowUp>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    /// Moves to `next` and bumps `updated_at`. Callers check legality first.
    pub fn set_status(&mut self, next: ShipmentStatus, now: DateTime<Utc>) {
        self.status = next;
        self.touch(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn can_transition_to(&self, next: ShipmentStatus) -> bool {
        self.status.can_transition_to(self.workflow, next)
    }

    pub fn awaiting_reconciliation(&self) -> bool {
        self.is_cod && self.cod_collected && !self.cod_reconciled
    }
}

impl Document for Shipment {
    fn id(&self) -> Uuid {
        self.id
    }
}

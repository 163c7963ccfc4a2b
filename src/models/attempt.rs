use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::shipment::{PaymentMethod, ProofBundle, ShipmentStatus};
use crate::store::Document;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Delivered,
    Cancelled,
    NoResponse,
    Rescheduled,
}

impl AttemptOutcome {
    pub fn target_status(self) -> ShipmentStatus {
        match self {
            AttemptOutcome::Delivered => ShipmentStatus::Delivered,
            AttemptOutcome::Cancelled => ShipmentStatus::Cancelled,
            AttemptOutcome::NoResponse => ShipmentStatus::NoResponse,
            AttemptOutcome::Rescheduled => ShipmentStatus::Rescheduled,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.target_status().as_str()
    }
}

/// Immutable record of one field visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub run_sheet_id: Uuid,
    pub courier_id: Uuid,
    pub outcome: AttemptOutcome,
    pub amount_collected: i64,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub reschedule_date: Option<String>,
    pub proof: Option<ProofBundle>,
    pub created_at: DateTime<Utc>,
}

impl Document for DeliveryAttempt {
    fn id(&self) -> Uuid {
        self.id
    }
}

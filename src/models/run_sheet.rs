use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Document;

/// A courier's manifest for one outbound/inbound cycle.
///
/// The totals are a point-in-time commitment taken when the sheet is
/// created; later edits to member shipments do not change them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSheet {
    pub id: Uuid,
    pub courier_id: Uuid,
    pub shipment_ids: Vec<Uuid>,
    pub total_value: i64,
    pub cash_to_collect: i64,
    pub card_to_collect: i64,
    pub is_scanned_out: bool,
    pub scanned_out_at: Option<DateTime<Utc>>,
    pub is_scanned_in: bool,
    pub scanned_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Document for RunSheet {
    fn id(&self) -> Uuid {
        self.id
    }
}

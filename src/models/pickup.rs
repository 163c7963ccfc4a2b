use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::shipment::ProofBundle;
use crate::store::Document;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PickupType {
    SellerPickup,
    CustomerReturn,
    PersonalShopping,
    UnsubmittedItems,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Pending,
    Assigned,
    Partial,
    Completed,
    Cancelled,
}

impl PickupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PickupStatus::Pending => "pending",
            PickupStatus::Assigned => "assigned",
            PickupStatus::Partial => "partial",
            PickupStatus::Completed => "completed",
            PickupStatus::Cancelled => "cancelled",
        }
    }
}

/// Quantity-by-category line of a seller pickup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryItem {
    pub category: String,
    pub quantity: u32,
    #[serde(default)]
    pub value: i64,
}

/// Named, valued line of a personal-shopping pickup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShoppingItem {
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub is_delivered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pickup {
    pub id: Uuid,
    pub pickup_type: PickupType,
    pub status: PickupStatus,
    pub customer_name: String,
    pub customer_phone: String,
    pub address: String,
    pub category_items: Vec<CategoryItem>,
    pub shopping_items: Vec<ShoppingItem>,
    pub total_value: i64,
    pub collected_value: i64,
    pub courier_id: Option<Uuid>,
    pub courier_name: Option<String>,
    pub proof: Option<ProofBundle>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pickup {
    pub fn delivered_value(&self) -> i64 {
        self.shopping_items
            .iter()
            .filter(|item| item.is_delivered)
            .map(|item| item.value)
            .sum()
    }

    /// Status implied by the delivered share of a personal-shopping pickup:
    /// completed at full value, partial strictly in between, otherwise the
    /// current status is kept.
    pub fn derived_shopping_status(&self) -> PickupStatus {
        let collected = self.delivered_value();
        if collected == self.total_value {
            PickupStatus::Completed
        } else if collected > 0 && collected < self.total_value {
            PickupStatus::Partial
        } else {
            self.status
        }
    }
}

impl Document for Pickup {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Append-only ledger row for one delivery event on a personal-shopping pickup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShoppingHistoryEntry {
    pub id: Uuid,
    pub pickup_id: Uuid,
    pub item_indices: Vec<usize>,
    pub item_names: Vec<String>,
    pub value_collected: i64,
    pub courier_id: Option<Uuid>,
    pub proof: Option<ProofBundle>,
    pub created_at: DateTime<Utc>,
}

impl Document for ShoppingHistoryEntry {
    fn id(&self) -> Uuid {
        self.id
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Document;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BinLocation {
    pub id: Uuid,
    pub code: String,
    pub route_tag: String,
    pub capacity: u32,
    pub current_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BinLocation {
    pub fn has_room(&self) -> bool {
        self.current_count < self.capacity
    }
}

impl Document for BinLocation {
    fn id(&self) -> Uuid {
        self.id
    }
}

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::models::attempt::DeliveryAttempt;
use crate::models::bin::BinLocation;
use crate::models::courier::Courier;
use crate::models::pickup::{Pickup, ShoppingHistoryEntry};
use crate::models::run_sheet::RunSheet;
use crate::models::shipment::Shipment;
use crate::observability::metrics::Metrics;
use crate::store::Collection;

pub struct AppState {
    pub shipments: Collection<Shipment>,
    pub couriers: Collection<Courier>,
    pub run_sheets: Collection<RunSheet>,
    pub delivery_attempts: Collection<DeliveryAttempt>,
    pub pickups: Collection<Pickup>,
    pub shopping_history: Collection<ShoppingHistoryEntry>,
    pub bin_locations: Collection<BinLocation>,
    /// AWB -> shipment id; the entry API keeps AWBs unique.
    pub awb_index: DashMap<String, Uuid>,
    /// Bin code -> bin id, same role as `awb_index`.
    pub bin_codes: DashMap<String, Uuid>,
    pub enforce_bin_capacity: bool,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            shipments: Collection::new("shipments"),
            couriers: Collection::new("couriers"),
            run_sheets: Collection::new("run_sheets"),
            delivery_attempts: Collection::new("delivery_attempts"),
            pickups: Collection::new("pickups"),
            shopping_history: Collection::new("shopping_history"),
            bin_locations: Collection::new("bin_locations"),
            awb_index: DashMap::new(),
            bin_codes: DashMap::new(),
            enforce_bin_capacity: config.enforce_bin_capacity,
            metrics: Metrics::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

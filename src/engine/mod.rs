pub mod attempts;
pub mod bins;
pub mod couriers;
pub mod dashboard;
pub mod ledger;
pub mod pickups;
pub mod run_sheets;
pub mod shipments;

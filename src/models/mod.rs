pub mod attempt;
pub mod batch;
pub mod bin;
pub mod courier;
pub mod pickup;
pub mod run_sheet;
pub mod shipment;

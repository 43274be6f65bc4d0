//! CLI command handling

pub mod layout;
pub mod ship;
pub mod start;

pub use ship::{handle_ship, ShipArgs};
pub use start::{handle_start, StartArgs};

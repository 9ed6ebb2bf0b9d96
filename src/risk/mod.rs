// Risk management module
pub mod position_cap;

pub use position_cap::{PositionCap, PositionCapTrip};

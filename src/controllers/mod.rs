pub mod altitude;
pub mod takeoff;

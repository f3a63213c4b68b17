pub mod config;
pub mod control;
pub mod flight_mode;
pub mod guidance;
pub mod measurements;
pub mod mission;
pub mod status;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod adapter;
use adapter::postcard::PostcardError;

#[non_exhaustive]
#[derive(Serialize, Deserialize, Error, Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GuidanceError {
    #[error("Path plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Postcard ser/de error: {0}")]
    Postcard(#[from] PostcardError),
}

/// Reasons for a path plan to be rejected by the waypoint sequencer.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlanError {
    #[error("The path plan contains no waypoints.")]
    Empty,
    #[error("The path plan declares {declared} waypoints, but only {loaded} are loaded.")]
    WaypointCount { declared: u16, loaded: u16 },
    #[error("The path plan declares {declared} actions, but only {loaded} are loaded.")]
    ActionCount { declared: u16, loaded: u16 },
    #[error("Calculated checksum {calculated:#04x} did not match the stored {stored:#04x}.")]
    InvalidChecksum { calculated: u8, stored: u8 },
    #[error("Waypoint {waypoint} refers to the out of range action {action}.")]
    ActionOutOfRange { waypoint: u16, action: u16 },
    #[error("Action {action} has an out of range jump destination.")]
    JumpOutOfRange { action: u16 },
    #[error("Action {action} has an out of range error destination.")]
    ErrorDestinationOutOfRange { action: u16 },
    #[error("Unable to encode mission records: {0}")]
    Encoding(#[from] PostcardError),
}

#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurationError {
    #[error("The thrust limits must satisfy min <= neutral <= max.")]
    ThrustLimits,
    #[error("The position hold offsets must be strictly positive.")]
    PositionHoldOffset,
    #[error("The battery failsafe switch position {0} is out of range.")]
    FailsafePosition(u8),
    #[error("The vario low-pass alpha must lie within [0, 1).")]
    VarioAlpha,
    #[error("The stick expo must lie within [-100, 100].")]
    StickExpo,
}

/// Settings records which can be checked for internal consistency before use.
pub trait Configuration {
    fn sanity_check(&self) -> Result<(), ConfigurationError>;
}

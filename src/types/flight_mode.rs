use serde::{Deserialize, Serialize};

/// Flight modes selectable through the flight mode switch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightMode {
    Manual,
    Stabilized1,
    Stabilized2,
    Stabilized3,
    Stabilized4,
    Stabilized5,
    Stabilized6,
    AutoTune,
    PositionHold,
    Land,
    AutoTakeoff,
    VelocityRoam,
    CourseLock,
    PositionRoam,
    HomeLeash,
    AbsolutePosition,
    ReturnToBase,
    Poi,
    AutoCruise,
    PathPlanner,
}

impl FlightMode {
    /// Index of a `StabilizedN` mode into per-bank settings.
    pub const fn stabilization_bank(&self) -> Option<usize> {
        match self {
            FlightMode::Stabilized1 => Some(0),
            FlightMode::Stabilized2 => Some(1),
            FlightMode::Stabilized3 => Some(2),
            FlightMode::Stabilized4 => Some(3),
            FlightMode::Stabilized5 => Some(4),
            FlightMode::Stabilized6 => Some(5),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlChain(u8);

bitflags::bitflags! {
    /// The control loops which are engaged by the current flight mode.
    impl ControlChain: u8 {
        /// **Bit 0** - Attitude stabilization is engaged.
        const STABILIZATION = 1 << 0;

        /// **Bit 1** - The path follower is engaged.
        const PATH_FOLLOWER = 1 << 1;

        /// **Bit 2** - The waypoint sequencer is engaged.
        const PATH_PLANNER  = 1 << 2;
    }
}

/// The downstream handler selected by the flight mode arbiter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlHandler {
    Manual,
    Stabilized,
    PathFollower,
    PathPlanner,
}

impl ControlHandler {
    pub const fn control_chain(&self) -> ControlChain {
        match self {
            ControlHandler::Manual => ControlChain::empty(),
            ControlHandler::Stabilized => ControlChain::STABILIZATION,
            ControlHandler::PathFollower => {
                ControlChain::STABILIZATION.union(ControlChain::PATH_FOLLOWER)
            }
            ControlHandler::PathPlanner => ControlChain::STABILIZATION
                .union(ControlChain::PATH_FOLLOWER)
                .union(ControlChain::PATH_PLANNER),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightModeAssist {
    None,
    /// Position assist, with the pilot keeping control of thrust
    GpsAssistPrimaryThrust,
    GpsAssist,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssistedControlState {
    Primary,
    Brake,
    Hold,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssistedThrottleState {
    Manual,
    Auto,
    AutoOverride,
}

/// Flight mode together with its control chain and assist sub-states. These
/// are always published together as one record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightStatus {
    pub armed: bool,
    pub flight_mode: FlightMode,
    pub control_chain: ControlChain,
    pub always_stabilize_when_armed: bool,
    pub flight_mode_assist: FlightModeAssist,
    pub assisted_control_state: AssistedControlState,
    pub assisted_throttle_state: AssistedThrottleState,
}

crate::const_default!(
    FlightStatus => {
        armed: false,
        flight_mode: FlightMode::Manual,
        control_chain: ControlChain::empty(),
        always_stabilize_when_armed: false,
        flight_mode_assist: FlightModeAssist::None,
        assisted_control_state: AssistedControlState::Primary,
        assisted_throttle_state: AssistedThrottleState::Manual,
    }
);

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmSeverity {
    Uninitialised,
    Ok,
    Warning,
    Critical,
    Error,
}

/// Alarms raised by, or consumed by, the guidance core.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemAlarms {
    pub battery: AlarmSeverity,
    pub guidance: AlarmSeverity,
    pub path_plan: AlarmSeverity,
    /// Raised when the most recent settings record was rejected
    pub settings: AlarmSeverity,
}

crate::const_default!(
    SystemAlarms => {
        battery: AlarmSeverity::Uninitialised,
        guidance: AlarmSeverity::Uninitialised,
        path_plan: AlarmSeverity::Uninitialised,
        settings: AlarmSeverity::Uninitialised,
    }
);

/// States of the auto-takeoff sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoTakeoffState {
    Inactive,
    CheckState,
    SlowStart,
    ThrustUp,
    Takeoff,
    Hold,
    ThrustDown,
    ThrustOff,
    Disarmed,
}

impl AutoTakeoffState {
    pub const COUNT: usize = 9;

    pub const fn index(&self) -> usize {
        *self as usize
    }
}

/// Why the auto-takeoff sequence left a state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExitReason {
    None,
    Timeout,
    ZeroThrust,
    PositionError,
    ArrivedAtAlt,
}

/// Pilot-facing gate in front of the auto-takeoff sequence. Carried as a
/// float in the auto-takeoff mode parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AutoTakeoffControlState {
    WaitForArmed = 0,
    WaitForMidThrottle = 1,
    RequireUnarmedFirst = 2,
    Initiate = 3,
    PositionHold = 4,
    Abort = 5,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AltitudeState {
    Low,
    High,
}

/// Telemetry of the auto-takeoff sequence.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutoTakeoffStatus {
    pub state: AutoTakeoffState,
    /// Altitude above the takeoff location when each state was entered
    pub altitude_at_state: [f32; AutoTakeoffState::COUNT],
    pub exit_reason: [ExitReason; AutoTakeoffState::COUNT],
    pub altitude_state: AltitudeState,
    pub control_state: AutoTakeoffControlState,
}

crate::const_default!(
    AutoTakeoffStatus => {
        state: AutoTakeoffState::Inactive,
        altitude_at_state: [0.0; AutoTakeoffState::COUNT],
        exit_reason: [ExitReason::None; AutoTakeoffState::COUNT],
        altitude_state: AltitudeState::Low,
        control_state: AutoTakeoffControlState::WaitForArmed,
    }
);

/// Results of the in-flight neutral thrust learning.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VtolSelfTuningStats {
    /// Accumulated offset from the configured neutral thrust
    pub neutral_thrust_offset: f32,
    /// Correction applied by the last completed estimate
    pub neutral_thrust_correction: f32,
    /// Integral term after the last correction
    pub neutral_thrust_accumulator: f32,
    /// Spread of the integral term over the last sample window
    pub neutral_thrust_range: f32,
}

crate::const_default!(
    VtolSelfTuningStats => {
        neutral_thrust_offset: 0.0,
        neutral_thrust_correction: 0.0,
        neutral_thrust_accumulator: 0.0,
        neutral_thrust_range: 0.0,
    }
);

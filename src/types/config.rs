use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

use super::flight_mode::FlightMode;
use crate::errors::{Configuration, ConfigurationError};
use crate::NUM_FLIGHT_MODE_POSITIONS;

/// Thrust handling of a stabilized flight mode bank.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThrustMode {
    Manual,
    CruiseControl,
    AltitudeHold,
    AltitudeVario,
}

/// What the vehicle does after returning to base.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ReturnToBaseNextCommand {
    Hold = 0,
    Land = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailsafeSwitchPositions {
    pub warning: Option<u8>,
    pub critical: Option<u8>,
}

/// Distance between the start and end point of hold targets, and the reach
/// of the vario modes [m].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PositionHoldOffset {
    pub horizontal: f32,
    pub vertical: f32,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightModeSettings {
    pub flight_mode_position: [FlightMode; NUM_FLIGHT_MODE_POSITIONS],
    /// Thrust mode of the `Stabilized1..6` banks
    pub stabilization_thrust: [ThrustMode; 6],
    /// Accessory channel which toggles always-stabilize-when-armed
    pub always_stabilize_when_armed_switch: Option<u8>,
    pub always_stabilize_when_armed_throttle_threshold: f32,
    pub battery_failsafe_debounce_ms: u32,
    pub battery_failsafe_switch_positions: FailsafeSwitchPositions,
    pub position_hold_offset: PositionHoldOffset,
    pub vario_control_lowpass_alpha: f32,
    pub return_to_base_altitude_offset: f32,
    pub return_to_base_velocity: f32,
    pub return_to_base_next_command: ReturnToBaseNextCommand,
    pub auto_takeoff_height: f32,
    pub landing_velocity: f32,
    pub flight_mode_change_restarts_path_plan: bool,
}

crate::const_default!(
    FlightModeSettings => {
        flight_mode_position: [
            FlightMode::Stabilized1,
            FlightMode::Stabilized2,
            FlightMode::Stabilized3,
            FlightMode::PositionHold,
            FlightMode::ReturnToBase,
            FlightMode::Land,
        ],
        stabilization_thrust: [ThrustMode::Manual; 6],
        always_stabilize_when_armed_switch: None,
        always_stabilize_when_armed_throttle_threshold: 0.0,
        battery_failsafe_debounce_ms: 5000,
        battery_failsafe_switch_positions: FailsafeSwitchPositions {
            warning: None,
            critical: None,
        },
        position_hold_offset: PositionHoldOffset {
            horizontal: 10.0,
            vertical: 4.0,
        },
        vario_control_lowpass_alpha: 0.98,
        return_to_base_altitude_offset: 10.0,
        return_to_base_velocity: 2.0,
        return_to_base_next_command: ReturnToBaseNextCommand::Hold,
        auto_takeoff_height: 2.5,
        landing_velocity: 0.6,
        flight_mode_change_restarts_path_plan: true,
    }
);

impl Configuration for FlightModeSettings {
    fn sanity_check(&self) -> Result<(), ConfigurationError> {
        let offset = &self.position_hold_offset;
        if !(offset.horizontal > 0.0 && offset.vertical > 0.0) {
            return Err(ConfigurationError::PositionHoldOffset);
        }

        let positions = &self.battery_failsafe_switch_positions;
        for position in [positions.warning, positions.critical].into_iter().flatten() {
            if position as usize >= NUM_FLIGHT_MODE_POSITIONS {
                return Err(ConfigurationError::FailsafePosition(position));
            }
        }

        if !(0.0..1.0).contains(&self.vario_control_lowpass_alpha) {
            return Err(ConfigurationError::VarioAlpha);
        }

        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThrustLimits {
    pub min: f32,
    pub neutral: f32,
    pub max: f32,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VelocityPid {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub beta: f32,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VtolPathFollowerSettings {
    pub thrust_limits: ThrustLimits,
    /// [m/s]
    pub horizontal_vel_max: f32,
    /// [m/s]
    pub vertical_vel_max: f32,
    /// Deceleration used when planning a brake [m/s^2]
    pub brake_rate: f32,
    /// Gain of the altitude to vertical velocity loop
    pub vertical_pos_p: f32,
    pub vertical_vel_pid: VelocityPid,
    /// Climb rate during auto-takeoff [m/s]
    pub takeoff_velocity: f32,
}

crate::const_default!(
    VtolPathFollowerSettings => {
        thrust_limits: ThrustLimits {
            min: 0.2,
            neutral: 0.5,
            max: 0.9,
        },
        horizontal_vel_max: 10.0,
        vertical_vel_max: 4.0,
        brake_rate: 2.5,
        vertical_pos_p: 0.4,
        vertical_vel_pid: VelocityPid {
            kp: 0.3,
            ki: 0.25,
            kd: 0.0,
            beta: 0.9,
        },
        takeoff_velocity: 0.6,
    }
);

impl Configuration for VtolPathFollowerSettings {
    fn sanity_check(&self) -> Result<(), ConfigurationError> {
        let limits = &self.thrust_limits;
        if limits.min <= limits.neutral && limits.neutral <= limits.max {
            Ok(())
        } else {
            Err(ConfigurationError::ThrustLimits)
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightModeAssistMap {
    None,
    GpsAssist,
}

/// Exponential stick response, `[-100, 100]` where `0` is linear.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StickExpo {
    pub roll: i8,
    pub pitch: i8,
    pub yaw: i8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StabilizationSettings {
    pub flight_mode_assist_map: [FlightModeAssistMap; NUM_FLIGHT_MODE_POSITIONS],
    pub stick_expo: StickExpo,
}

crate::const_default!(
    StabilizationSettings => {
        flight_mode_assist_map: [FlightModeAssistMap::None; NUM_FLIGHT_MODE_POSITIONS],
        stick_expo: StickExpo {
            roll: 0,
            pitch: 0,
            yaw: 0,
        },
    }
);

impl Configuration for StabilizationSettings {
    fn sanity_check(&self) -> Result<(), ConfigurationError> {
        let expo = &self.stick_expo;
        if [expo.roll, expo.pitch, expo.yaw]
            .iter()
            .all(|e| (-100..=100).contains(e))
        {
            Ok(())
        } else {
            Err(ConfigurationError::StickExpo)
        }
    }
}

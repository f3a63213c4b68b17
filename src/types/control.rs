use serde::{Deserialize, Serialize};

use crate::NUM_ACCESSORY;

/// Pilot input as decoded by the receiver.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ManualControlCommand {
    /// Roll stick, `[-1, 1]`
    pub roll: f32,
    /// Pitch stick, `[-1, 1]`
    pub pitch: f32,
    /// Yaw stick, `[-1, 1]`
    pub yaw: f32,
    /// Thrust demand, `[0, 1]` (negative when cut)
    pub thrust: f32,
    /// Raw throttle stick, `[-1, 1]`
    pub throttle: f32,
    pub flight_mode_switch_position: u8,
}

crate::const_default!(
    ManualControlCommand => {
        roll: 0.0,
        pitch: 0.0,
        yaw: 0.0,
        thrust: 0.0,
        throttle: -1.0,
        flight_mode_switch_position: 0,
    }
);

impl ManualControlCommand {
    /// Whether any roll or pitch is commanded.
    pub fn roll_pitch_has_input(&self) -> bool {
        self.roll != 0.0 || self.pitch != 0.0
    }
}

/// Auxiliary channels, `[-1, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccessoryDesired(pub [f32; NUM_ACCESSORY]);

crate::const_default!(AccessoryDesired => AccessoryDesired([0.0; NUM_ACCESSORY]));

/// Attitude and thrust sent to the stabilization loops.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StabilizationDesired {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
}

crate::const_default!(
    StabilizationDesired => {
        roll: 0.0,
        pitch: 0.0,
        yaw: 0.0,
        thrust: 0.0,
    }
);

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

use super::measurements::Ned;

/// How the path follower should interpret a [`GuidanceTarget`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PathMode {
    FlyEndpoint,
    FlyVector,
    FlyCircleRight,
    FlyCircleLeft,
    GotoEndpoint,
    FollowVector,
    CircleRight,
    CircleLeft,
    FixedAttitude,
    SetAccessory,
    DisarmAlarm,
    Land,
    Brake,
    Velocity,
    AutoTakeoff,
}

/// Index of the next command in `GotoEndpoint` mode parameters.
pub const GOTO_ENDPOINT_NEXT_COMMAND: usize = 0;
/// Index of the landing option in `Land` mode parameters.
pub const LAND_OPTIONS: usize = 3;
/// Index of the brake timeout in `Brake` mode parameters.
pub const BRAKE_TIMEOUT: usize = 3;
/// Index of the control state in `AutoTakeoff` mode parameters.
pub const AUTOTAKEOFF_CONTROL_STATE: usize = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LandOption {
    None = 0,
    HorizontalPositionHold = 1,
}

/// Geometric and kinematic target for the path follower.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GuidanceTarget {
    pub start: Ned,
    pub end: Ned,
    pub starting_velocity: f32,
    pub ending_velocity: f32,
    pub mode: PathMode,
    pub mode_parameters: [f32; 4],
    /// Identifies the revision of the target, echoed by the path follower
    /// through [`PathStatus::sequence_id`] once it is being flown.
    pub sequence_id: i16,
}

crate::const_default!(
    GuidanceTarget => {
        start: Ned::const_default(),
        end: Ned::const_default(),
        starting_velocity: 0.0,
        ending_velocity: 0.0,
        mode: PathMode::GotoEndpoint,
        mode_parameters: [0.0; 4],
        sequence_id: 0,
    }
);

impl GuidanceTarget {
    /// Decode a mode parameter which carries an enumeration.
    pub fn parameter_as<T: TryFromPrimitive<Primitive = u8>>(&self, index: usize) -> Option<T> {
        let value = *self.mode_parameters.get(index)?;
        if !(0.0..=u8::MAX as f32).contains(&value) {
            return None;
        }
        T::try_from_primitive(value as u8).ok()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PathStatusCode {
    InProgress,
    Completed,
    Warning,
    Critical,
}

/// Progress report published by the path follower.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PathStatus {
    /// Fraction of the current leg completed, `[0, 1]`
    pub fractional_progress: f32,
    /// Distance from the path [m]
    pub error: f32,
    pub sequence_id: i16,
    pub status: PathStatusCode,
}

crate::const_default!(
    PathStatus => {
        fractional_progress: 0.0,
        error: 0.0,
        sequence_id: -1,
        status: PathStatusCode::InProgress,
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_parameters() {
        let mut target = GuidanceTarget::const_default();
        target.mode_parameters[LAND_OPTIONS] = 1.0;
        assert_eq!(
            target.parameter_as::<LandOption>(LAND_OPTIONS),
            Some(LandOption::HorizontalPositionHold)
        );

        target.mode_parameters[LAND_OPTIONS] = 7.0;
        assert_eq!(target.parameter_as::<LandOption>(LAND_OPTIONS), None);

        target.mode_parameters[LAND_OPTIONS] = -1.0;
        assert_eq!(target.parameter_as::<LandOption>(LAND_OPTIONS), None);
    }
}

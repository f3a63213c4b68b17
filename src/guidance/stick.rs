//! Shaping of the pilot's stick input for the assisted modes.

#[allow(unused_imports)]
use num_traits::Float;

/// Stick travel around the center which is ignored
const DEADBAND: f32 = 0.1;

/// Base of the expo curve, `2^(1/100)`, so that an expo of 100 yields
/// `value^2` and an expo of -100 yields `value^(1/2)`.
const EXPO_BASE: f32 = 1.00695;

/// Apply an exponential response to a stick value in `[-1, 1]`. The sign is
/// kept, and the magnitude stays within `[0, 1]`.
pub fn apply_expo(value: f32, expo: f32) -> f32 {
    let exponent = EXPO_BASE.powf(expo).clamp(0.5, 2.0);

    if value > 0.0 {
        value.powf(exponent).clamp(0.0, 1.0)
    } else if value < 0.0 {
        (-(-value).powf(exponent)).clamp(-1.0, 0.0)
    } else {
        0.0
    }
}

/// Stick input for the position vario modes. Roll, pitch and yaw are in
/// `[-1, 1]`, thrust is in `[0, 1]` until normalized.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ControlVector {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
}

impl ControlVector {
    fn axes_mut(&mut self) -> [&mut f32; 4] {
        [
            &mut self.roll,
            &mut self.pitch,
            &mut self.yaw,
            &mut self.thrust,
        ]
    }
}

/// Map thrust onto `[-1, 1]`, cut the deadband from every axis and rescale
/// the remaining travel to `[-1, 1]`. Returns whether any axis lies outside
/// the deadband.
pub fn normalize_deadband(vector: &mut ControlVector) -> bool {
    let mut moving = false;
    vector.thrust = 2.0 * vector.thrust - 1.0;

    for axis in vector.axes_mut() {
        if *axis < -DEADBAND {
            moving = true;
            *axis += DEADBAND;
        } else if *axis > DEADBAND {
            moving = true;
            *axis -= DEADBAND;
        } else {
            *axis = 0.0;
        }

        *axis = (*axis * (1.0 / (1.0 - DEADBAND))).clamp(-1.0, 1.0);
    }

    moving
}

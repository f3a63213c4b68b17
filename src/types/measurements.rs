use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use num_traits::Float;

/// Position or velocity in the local north-east-down frame.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ned {
    pub north: f32,
    pub east: f32,
    pub down: f32,
}

crate::const_default!(
    Ned => {
        north: 0.0,
        east: 0.0,
        down: 0.0,
    }
);

impl Ned {
    pub const fn new(north: f32, east: f32, down: f32) -> Self {
        Ned { north, east, down }
    }

    pub fn to_vector(&self) -> Vector3<f32> {
        Vector3::new(self.north, self.east, self.down)
    }

    pub fn from_vector(vector: &Vector3<f32>) -> Self {
        Ned::new(vector.x, vector.y, vector.z)
    }

    /// Same point, displaced north by `offset`.
    pub fn offset_north(&self, offset: f32) -> Self {
        Ned::new(self.north + offset, self.east, self.down)
    }

    /// Euclidean norm of the north and east components.
    pub fn horizontal_norm(&self) -> f32 {
        (self.north * self.north + self.east * self.east).sqrt()
    }

    /// Euclidean norm of all three components.
    pub fn norm(&self) -> f32 {
        self.to_vector().norm()
    }
}

impl core::ops::Sub for Ned {
    type Output = Ned;
    fn sub(self, rhs: Self) -> Self::Output {
        Ned::new(
            self.north - rhs.north,
            self.east - rhs.east,
            self.down - rhs.down,
        )
    }
}

/// Attitude estimate in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttitudeState {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

crate::const_default!(
    AttitudeState => {
        roll: 0.0,
        pitch: 0.0,
        yaw: 0.0,
    }
);

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AirspeedState {
    /// Calibrated airspeed [m/s]
    pub calibrated: f32,
}

crate::const_default!(
    AirspeedState => {
        calibrated: 0.0,
    }
);

/// Location at which the vehicle was last armed.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TakeoffLocation {
    pub position: Ned,
    pub valid: bool,
}

crate::const_default!(
    TakeoffLocation => {
        position: Ned::const_default(),
        valid: false,
    }
);

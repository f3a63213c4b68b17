use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::{guidance::PathMode, measurements::Ned};
use crate::errors::{adapter::postcard::PostcardError, PlanError};
use crate::utils::crc8::Crc8;
use crate::{MAX_PATH_ACTIONS, MAX_WAYPOINTS};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Waypoint {
    pub position: Ned,
    /// Velocity at which the waypoint is reached [m/s]
    pub velocity: f32,
    /// Index of the path action flown toward this waypoint
    pub action: u16,
}

/// Predicate deciding when the active waypoint is complete.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndCondition {
    None,
    TimeOut,
    DistanceToTarget,
    LegRemaining,
    BelowError,
    AboveAltitude,
    AboveSpeed,
    PointingTowardsNext,
    PythonScript,
    Immediate,
}

/// What to do with the outcome of the [`EndCondition`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PathCommand {
    OnConditionNextWaypoint,
    OnNotConditionNextWaypoint,
    OnConditionJumpWaypoint,
    OnNotConditionJumpWaypoint,
    IfConditionJumpWaypointElseNextWaypoint,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PathAction {
    pub mode: PathMode,
    pub mode_parameters: [f32; 4],
    pub end_condition: EndCondition,
    pub condition_parameters: [f32; 4],
    pub command: PathCommand,
    /// Negative values are relative, and jump to `index - destination`
    pub jump_destination: i16,
    /// Negative values disable the error jump
    pub error_destination: i16,
}

/// Header of the loaded mission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PathPlan {
    pub waypoint_count: u16,
    pub action_count: u16,
    pub crc: u8,
}

crate::const_default!(
    PathPlan => {
        waypoint_count: 0,
        action_count: 0,
        crc: 0,
    }
);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaypointActive {
    pub index: u16,
}

crate::const_default!(WaypointActive => { index: 0 });

/// Fixed capacity storage of the loaded waypoints and path actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionStore {
    pub waypoints: Vec<Waypoint, MAX_WAYPOINTS>,
    pub actions: Vec<PathAction, MAX_PATH_ACTIONS>,
}

crate::const_default!(
    MissionStore => {
        waypoints: Vec::new(),
        actions: Vec::new(),
    }
);

impl MissionStore {
    pub fn waypoint(&self, index: u16) -> Option<&Waypoint> {
        self.waypoints.get(index as usize)
    }

    pub fn action(&self, index: u16) -> Option<&PathAction> {
        self.actions.get(index as usize)
    }

    /// CRC8 over the encoded form of the first `waypoint_count` waypoints,
    /// followed by the first `action_count` actions.
    pub fn checksum(&self, waypoint_count: u16, action_count: u16) -> Result<u8, PlanError> {
        let mut crc = Crc8::new();
        let mut buf = [0u8; 64];

        for waypoint in self.waypoints.iter().take(waypoint_count as usize) {
            let bytes = postcard::to_slice(waypoint, &mut buf).map_err(PostcardError::from)?;
            crc.update(bytes);
        }

        for action in self.actions.iter().take(action_count as usize) {
            let bytes = postcard::to_slice(action, &mut buf).map_err(PostcardError::from)?;
            crc.update(bytes);
        }

        Ok(crc.checksum())
    }

    /// Create the plan header describing every loaded record.
    pub fn path_plan(&self) -> Result<PathPlan, PlanError> {
        let waypoint_count = self.waypoints.len() as u16;
        let action_count = self.actions.len() as u16;
        Ok(PathPlan {
            waypoint_count,
            action_count,
            crc: self.checksum(waypoint_count, action_count)?,
        })
    }
}

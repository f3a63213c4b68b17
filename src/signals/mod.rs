//! The shared state registry. Every record lives in its own [`Watch`] and is
//! always read and written as a whole, so a reader never observes a partially
//! written record. There are no transactions across records; consumers must
//! tolerate a related record from the same producer tick not being published
//! yet.

use mutex::raw_impls::cs::CriticalSectionRawMutex as M;

use crate::sync::watch::Watch;
use crate::types::{
    config::{FlightModeSettings, StabilizationSettings, VtolPathFollowerSettings},
    control::{AccessoryDesired, ManualControlCommand, StabilizationDesired},
    flight_mode::FlightStatus,
    guidance::{GuidanceTarget, PathStatus},
    measurements::{AirspeedState, AttitudeState, Ned, TakeoffLocation},
    mission::{MissionStore, PathPlan, WaypointActive},
    status::{AutoTakeoffStatus, SystemAlarms, VtolSelfTuningStats},
};

pub struct Registry {
    // Vehicle state, produced by the estimator
    pub position: Watch<Ned, M>,
    pub velocity: Watch<Ned, M>,
    pub attitude: Watch<AttitudeState, M>,
    pub airspeed: Watch<AirspeedState, M>,
    pub takeoff_location: Watch<TakeoffLocation, M>,

    // Pilot input
    pub manual_control: Watch<ManualControlCommand, M>,
    pub accessory: Watch<AccessoryDesired, M>,

    // Flight mode arbitration and guidance
    pub flight_status: Watch<FlightStatus, M>,
    pub guidance_target: Watch<GuidanceTarget, M>,
    pub path_status: Watch<PathStatus, M>,
    pub stabilization_desired: Watch<StabilizationDesired, M>,

    // Mission
    pub mission: Watch<MissionStore, M>,
    pub path_plan: Watch<PathPlan, M>,
    pub waypoint_active: Watch<WaypointActive, M>,

    // Status and telemetry
    pub alarms: Watch<SystemAlarms, M>,
    pub autotakeoff_status: Watch<AutoTakeoffStatus, M>,
    pub self_tuning: Watch<VtolSelfTuningStats, M>,

    // Settings
    pub flight_mode_settings: Watch<FlightModeSettings, M>,
    pub path_follower_settings: Watch<VtolPathFollowerSettings, M>,
    pub stabilization_settings: Watch<StabilizationSettings, M>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub const fn new() -> Self {
        Registry {
            position: Watch::new(Ned::const_default()),
            velocity: Watch::new(Ned::const_default()),
            attitude: Watch::new(AttitudeState::const_default()),
            airspeed: Watch::new(AirspeedState::const_default()),
            takeoff_location: Watch::new(TakeoffLocation::const_default()),
            manual_control: Watch::new(ManualControlCommand::const_default()),
            accessory: Watch::new(AccessoryDesired::const_default()),
            flight_status: Watch::new(FlightStatus::const_default()),
            guidance_target: Watch::new(GuidanceTarget::const_default()),
            path_status: Watch::new(PathStatus::const_default()),
            stabilization_desired: Watch::new(StabilizationDesired::const_default()),
            mission: Watch::new(MissionStore::const_default()),
            path_plan: Watch::new(PathPlan::const_default()),
            waypoint_active: Watch::new(WaypointActive::const_default()),
            alarms: Watch::new(SystemAlarms::const_default()),
            autotakeoff_status: Watch::new(AutoTakeoffStatus::const_default()),
            self_tuning: Watch::new(VtolSelfTuningStats::const_default()),
            flight_mode_settings: Watch::new(FlightModeSettings::const_default()),
            path_follower_settings: Watch::new(VtolPathFollowerSettings::const_default()),
            stabilization_settings: Watch::new(StabilizationSettings::const_default()),
        }
    }
}

/// Process-wide registry used by the periodic tasks.
pub static REGISTRY: Registry = Registry::new();

//! Waypoint sequencer. Validates the loaded mission and walks the graph of
//! waypoints and path actions, handing each leg to the path follower as a
//! guidance target.

use embassy_time::{Duration, Instant, Ticker};

use crate::consts::PATH_PLANNER_PERIOD_MS;
use crate::errors::PlanError;
use crate::guidance::plans::setup_position_hold;
use crate::signals::Registry;
use crate::tasks::settings::{report, SettingsGuard};
use crate::types::config::FlightModeSettings;
use crate::types::flight_mode::ControlChain;
use crate::types::guidance::{GuidanceTarget, PathStatusCode};
use crate::types::mission::{MissionStore, PathCommand, PathPlan, WaypointActive};
use crate::types::status::AlarmSeverity;

pub mod conditions;

use conditions::{ActiveLeg, TimeoutTimer, VehicleSnapshot};

const ID: &str = "path_planner";

/// Check the integrity of the loaded mission against its header.
pub fn check_path_plan(plan: &PathPlan, mission: &MissionStore) -> Result<(), PlanError> {
    if plan.waypoint_count == 0 {
        return Err(PlanError::Empty);
    }

    let loaded_waypoints = mission.waypoints.len() as u16;
    if plan.waypoint_count > loaded_waypoints {
        return Err(PlanError::WaypointCount {
            declared: plan.waypoint_count,
            loaded: loaded_waypoints,
        });
    }

    let loaded_actions = mission.actions.len() as u16;
    if plan.action_count > loaded_actions {
        return Err(PlanError::ActionCount {
            declared: plan.action_count,
            loaded: loaded_actions,
        });
    }

    let calculated = mission.checksum(plan.waypoint_count, plan.action_count)?;
    if calculated != plan.crc {
        return Err(PlanError::InvalidChecksum {
            calculated,
            stored: plan.crc,
        });
    }

    for (waypoint, index) in mission.waypoints.iter().zip(0..plan.waypoint_count) {
        if waypoint.action >= plan.action_count {
            return Err(PlanError::ActionOutOfRange {
                waypoint: index,
                action: waypoint.action,
            });
        }
    }

    let waypoint_count = plan.waypoint_count as i32;
    for (action, index) in mission.actions.iter().zip(0..plan.action_count) {
        if action.jump_destination as i32 >= waypoint_count {
            return Err(PlanError::JumpOutOfRange { action: index });
        }
        if action.error_destination as i32 >= waypoint_count {
            return Err(PlanError::ErrorDestinationOutOfRange { action: index });
        }
    }

    Ok(())
}

/// Resolve a jump destination. Negative destinations are relative to the
/// active index, and jump forward by their magnitude.
pub fn jump_destination(index: u16, destination: i16) -> u16 {
    if destination < 0 {
        index.saturating_add(destination.unsigned_abs())
    } else {
        destination as u16
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathPlanner {
    active: bool,
    hold_on_invalid_plan: bool,
    mission_id: usize,
    timer: TimeoutTimer,
    settings: SettingsGuard<FlightModeSettings>,
}

impl PathPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Run one step of the sequencer.
    pub fn tick(&mut self, registry: &Registry, now: Instant) {
        // Restore a rejected record before position hold reads it
        let update = self.settings.check(&registry.flight_mode_settings);
        report(ID, "flight mode", update, registry);

        let plan = registry.path_plan.get();
        let (mission, mission_id) = registry.mission.get_with_id();

        // Validate early, so the alarm is raised outside of guided flight too
        let validity = check_path_plan(&plan, &mission);

        let status = registry.flight_status.get();
        if !status.control_chain.contains(ControlChain::PATH_PLANNER) {
            self.active = false;
            Self::set_alarm(registry, AlarmSeverity::Ok);
            return;
        }

        if let Err(error) = validity {
            self.active = false;
            if !self.hold_on_invalid_plan {
                self.hold_on_invalid_plan = true;
                error!("{}: Path plan rejected: {}", ID, error);
                setup_position_hold(registry);
            }
            Self::set_alarm(registry, AlarmSeverity::Critical);
            return;
        }

        self.hold_on_invalid_plan = false;
        Self::set_alarm(registry, AlarmSeverity::Ok);

        // Arming is allowed while the path planner is selected
        if !status.armed {
            return;
        }

        let active_index = registry.waypoint_active.get().index;
        if !self.active {
            self.active = true;
            self.mission_id = mission_id;
            let restart = self.settings.get().flight_mode_change_restarts_path_plan;
            info!("{}: Path plan engaged", ID);
            self.set_waypoint(if restart { 0 } else { active_index }, registry);
            return;
        }

        if mission_id != self.mission_id {
            self.mission_id = mission_id;
            self.update_path_desired(registry);
        }

        let Some(waypoint) = mission.waypoint(active_index) else {
            return;
        };
        let Some(action) = mission.action(waypoint.action) else {
            return;
        };

        // Wait for the follower to acknowledge the current target
        let path_status = registry.path_status.get();
        if path_status.sequence_id != registry.guidance_target.get().sequence_id {
            return;
        }

        if path_status.status == PathStatusCode::Critical
            && action.error_destination >= 0
            && active_index as i16 != action.error_destination
        {
            warn!(
                "{}: Path follower failed, jumping to waypoint {}",
                ID, action.error_destination
            );
            self.set_waypoint(action.error_destination as u16, registry);
            return;
        }

        let next_index = (active_index as usize + 1) % mission.waypoints.len().max(1);
        let Some(next_waypoint) = mission.waypoint(next_index as u16) else {
            return;
        };

        let leg = ActiveLeg {
            index: active_index,
            waypoint,
            next_waypoint,
            action,
        };
        let vehicle = VehicleSnapshot {
            position: registry.position.get(),
            velocity: registry.velocity.get(),
            airspeed: registry.airspeed.get().calibrated,
            path_status,
        };
        let condition = conditions::check(&leg, &vehicle, &mut self.timer, now);

        let next = active_index.saturating_add(1);
        let jump = jump_destination(active_index, action.jump_destination);
        let target = match action.command {
            PathCommand::OnConditionNextWaypoint => condition.then_some(next),
            PathCommand::OnNotConditionNextWaypoint => (!condition).then_some(next),
            PathCommand::OnConditionJumpWaypoint => condition.then_some(jump),
            PathCommand::OnNotConditionJumpWaypoint => (!condition).then_some(jump),
            PathCommand::IfConditionJumpWaypointElseNextWaypoint => {
                Some(if condition { jump } else { next })
            }
        };

        if let Some(index) = target {
            self.set_waypoint(index, registry);
        }
    }

    /// Activate waypoint `index`, wrapping to the first waypoint past the end
    /// of the plan.
    pub fn set_waypoint(&mut self, index: u16, registry: &Registry) {
        let index = if index >= registry.path_plan.get().waypoint_count {
            0
        } else {
            index
        };

        debug!("{}: Active waypoint {}", ID, index);
        registry.waypoint_active.send(WaypointActive { index });
        self.update_path_desired(registry);
    }

    /// Publish the guidance target of the active leg. The first leg starts
    /// from the current position, the others from the previous waypoint.
    pub fn update_path_desired(&self, registry: &Registry) {
        if !self.active {
            return;
        }

        let index = registry.waypoint_active.get().index;
        let mission = registry.mission.get();
        let Some(waypoint) = mission.waypoint(index) else {
            return;
        };
        let Some(action) = mission.action(waypoint.action) else {
            return;
        };

        let mut target = GuidanceTarget::const_default();
        target.end = waypoint.position;
        target.ending_velocity = waypoint.velocity;
        target.mode = action.mode;
        target.mode_parameters = action.mode_parameters;
        target.sequence_id = index as i16;

        match index.checked_sub(1).and_then(|prev| mission.waypoint(prev)) {
            Some(previous) => {
                target.start = previous.position;
                target.starting_velocity = previous.velocity;
            }
            None => {
                target.start = registry.position.get();
                target.starting_velocity = waypoint.velocity;
            }
        }

        registry.guidance_target.send(target);
    }

    fn set_alarm(registry: &Registry, severity: AlarmSeverity) {
        if registry.alarms.get().path_plan != severity {
            registry.alarms.modify(|alarms| alarms.path_plan = severity);
        }
    }
}

pub async fn main(registry: &'static Registry) -> ! {
    info!("{}: Task started", ID);

    let mut planner = PathPlanner::new();
    let mut ticker = Ticker::every(Duration::from_millis(PATH_PLANNER_PERIOD_MS));

    info!("{}: Entering main loop", ID);
    loop {
        planner.tick(registry, Instant::now());
        ticker.next().await;
    }
}

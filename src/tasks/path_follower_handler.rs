//! Guidance of the flight modes flown by the path follower. A mode publishes
//! its first target when it is engaged, and the stick-driven modes keep
//! updating it every tick after that.

use embassy_time::Instant;

use crate::guidance::plans::{
    run_auto_takeoff, run_velocity_roam, setup_assisted_control, setup_auto_takeoff,
    setup_land, setup_position_hold, setup_return_to_base, PlanGenerator, VarioFrame,
};
use crate::signals::Registry;
use crate::types::flight_mode::{AssistedControlState, FlightMode, FlightModeAssist};
use crate::types::guidance::PathMode;

#[derive(Debug, Clone, Default)]
pub struct PathFollowerHandler {
    plans: PlanGenerator,
    braking: bool,
}

impl PathFollowerHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler of the modes where the path follower flies a single target.
    pub fn path_follower(&mut self, newinit: bool, registry: &Registry, now: Instant) {
        let status = registry.flight_status.get();
        let mode = status.flight_mode;

        if newinit {
            debug!("Path follower engaged in {:?}", mode);
            self.setup(mode, status.flight_mode_assist, registry);
        }

        // Assisted stabilized modes plan a brake when they enter it
        let braking = status.assisted_control_state == AssistedControlState::Brake;
        if mode.stabilization_bank().is_some() && braking && !self.braking {
            setup_assisted_control(registry);
        }
        self.braking = braking;

        if newinit {
            return;
        }

        match mode {
            FlightMode::CourseLock
            | FlightMode::PositionRoam
            | FlightMode::HomeLeash
            | FlightMode::AbsolutePosition => {
                if let Some(frame) = VarioFrame::from_flight_mode(mode) {
                    self.plans.run_position_vario(frame, registry);
                }
            }
            FlightMode::VelocityRoam => run_velocity_roam(registry),
            FlightMode::Land if status.flight_mode_assist != FlightModeAssist::None => {
                run_velocity_roam(registry)
            }
            FlightMode::AutoTakeoff => run_auto_takeoff(registry),
            FlightMode::AutoCruise => self.plans.run_auto_cruise(registry, now),
            FlightMode::Manual
            | FlightMode::Stabilized1
            | FlightMode::Stabilized2
            | FlightMode::Stabilized3
            | FlightMode::Stabilized4
            | FlightMode::Stabilized5
            | FlightMode::Stabilized6
            | FlightMode::AutoTune
            | FlightMode::PositionHold
            | FlightMode::Land
            | FlightMode::ReturnToBase
            | FlightMode::Poi
            | FlightMode::PathPlanner => {}
        }
    }

    /// Handler of the path planner mode. The targets come from the waypoint
    /// sequencer, except for the pilot gate of an auto-takeoff leg.
    pub fn path_planner(&mut self, newinit: bool, registry: &Registry) {
        if newinit {
            debug!("Path planner engaged");
            self.braking = false;
        }

        if registry.guidance_target.get().mode == PathMode::AutoTakeoff {
            run_auto_takeoff(registry);
        }
    }

    fn setup(&mut self, mode: FlightMode, assist: FlightModeAssist, registry: &Registry) {
        match mode {
            FlightMode::PositionHold if assist == FlightModeAssist::GpsAssist => {
                setup_assisted_control(registry)
            }
            FlightMode::PositionHold | FlightMode::Poi => setup_position_hold(registry),
            FlightMode::ReturnToBase => setup_return_to_base(registry),
            FlightMode::Land => setup_land(registry),
            FlightMode::AutoTakeoff => setup_auto_takeoff(registry),
            FlightMode::VelocityRoam => self.plans.setup_velocity_roam(registry),
            FlightMode::CourseLock
            | FlightMode::PositionRoam
            | FlightMode::HomeLeash
            | FlightMode::AbsolutePosition => self.plans.setup_position_vario(registry),
            FlightMode::AutoCruise => self.plans.setup_auto_cruise(registry),
            // Braking is planned on entry of the brake state
            FlightMode::Stabilized1
            | FlightMode::Stabilized2
            | FlightMode::Stabilized3
            | FlightMode::Stabilized4
            | FlightMode::Stabilized5
            | FlightMode::Stabilized6 => {}
            FlightMode::Manual | FlightMode::AutoTune | FlightMode::PathPlanner => {
                setup_position_hold(registry)
            }
        }
    }
}

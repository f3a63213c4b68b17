//! Flight mode arbiter. Every tick the flight mode, its assisted sub-states and
//! the engaged control chain are decided from the pilot input, and the
//! handler of the chain is run.

use embassy_time::{Duration, Instant, Ticker};

use crate::consts::MANUAL_CONTROL_PERIOD_MS;
use crate::signals::Registry;
use crate::tasks::path_follower_handler::PathFollowerHandler;
use crate::tasks::settings::{report, SettingsGuard};
use crate::types::config::{FlightModeSettings, StabilizationSettings, VtolPathFollowerSettings};
use crate::types::flight_mode::{
    AssistedControlState, AssistedThrottleState, ControlHandler, FlightMode, FlightModeAssist,
    FlightStatus,
};

pub mod assist;
pub mod failsafe;

use assist::{assist_for, default_throttle, AssistedControl};
use failsafe::BatteryFailsafe;

const ID: &str = "manual_control";

/// Accessory input beyond which always-stabilize is switched
const ALWAYS_STABILIZE_ACCESSORY_THRESHOLD: f32 = 0.05;

/// Outcome of one arbitration tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Arbitration {
    pub handler: ControlHandler,
    /// The flight status changed, so the handler starts over
    pub newinit: bool,
}

#[derive(Debug, Clone)]
pub struct FlightModeArbiter {
    first_run: bool,
    last_position: u8,
    failsafe: BatteryFailsafe,
    assisted: AssistedControl,
    path_follower: PathFollowerHandler,
    mode_settings: SettingsGuard<FlightModeSettings>,
    stabilization_settings: SettingsGuard<StabilizationSettings>,
    follower_settings: SettingsGuard<VtolPathFollowerSettings>,
}

impl Default for FlightModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightModeArbiter {
    pub fn new() -> Self {
        Self {
            first_run: true,
            last_position: 0,
            failsafe: BatteryFailsafe::new(),
            assisted: AssistedControl::new(),
            path_follower: PathFollowerHandler::new(),
            mode_settings: SettingsGuard::default(),
            stabilization_settings: SettingsGuard::default(),
            follower_settings: SettingsGuard::default(),
        }
    }

    pub fn failsafe(&self) -> &BatteryFailsafe {
        &self.failsafe
    }

    /// Decide the flight status of this tick, publish it when it changed and
    /// run the selected handler.
    pub fn tick(&mut self, registry: &Registry, now: Instant) -> Arbitration {
        let status = registry.flight_status.get();
        let command = registry.manual_control.get();

        // Rejected records are restored before any handler reads them
        let update = self.mode_settings.check(&registry.flight_mode_settings);
        report(ID, "flight mode", update, registry);
        let update = self
            .stabilization_settings
            .check(&registry.stabilization_settings);
        report(ID, "stabilization", update, registry);
        let update = self
            .follower_settings
            .check(&registry.path_follower_settings);
        report(ID, "path follower", update, registry);

        let mode_settings = self.mode_settings.get();
        let stabilization = self.stabilization_settings.get();
        let thrust_limits = self.follower_settings.get().thrust_limits;

        let mut position = self.failsafe.apply(
            command.flight_mode_switch_position,
            status.armed,
            registry.alarms.get().battery,
            &mode_settings,
            now,
        );

        let mut mode = mode_settings
            .flight_mode_position
            .get(position as usize)
            .copied()
            .unwrap_or(status.flight_mode);

        // Never start a takeoff with the vehicle armed, it may be airborne
        if mode == FlightMode::AutoTakeoff && status.armed {
            mode = status.flight_mode;
            position = self.last_position;
        }

        let mut assist = status.flight_mode_assist;
        let mut control_state = status.assisted_control_state;
        let mut throttle_state = status.assisted_throttle_state;

        if mode != status.flight_mode {
            assist = FlightModeAssist::None;
            control_state = AssistedControlState::Primary;
            throttle_state = AssistedThrottleState::Manual;
        }

        let handler = match mode {
            FlightMode::Manual => ControlHandler::Manual,
            FlightMode::Stabilized1
            | FlightMode::Stabilized2
            | FlightMode::Stabilized3
            | FlightMode::Stabilized4
            | FlightMode::Stabilized5
            | FlightMode::Stabilized6
            | FlightMode::AutoTune => {
                assist = assist_for(position, mode, &mode_settings, &stabilization);
                if assist != status.flight_mode_assist {
                    control_state = AssistedControlState::Primary;
                    throttle_state = AssistedThrottleState::Manual;
                }

                if assist == FlightModeAssist::None {
                    ControlHandler::Stabilized
                } else {
                    let decision = self.assisted.update(
                        assist,
                        control_state,
                        throttle_state,
                        &command,
                        &thrust_limits,
                        registry.self_tuning.get().neutral_thrust_offset,
                    );
                    control_state = decision.control_state;
                    throttle_state = decision.throttle_state;

                    if decision.path_follower {
                        ControlHandler::PathFollower
                    } else {
                        ControlHandler::Stabilized
                    }
                }
            }
            FlightMode::VelocityRoam => {
                assist = FlightModeAssist::GpsAssistPrimaryThrust;
                throttle_state = AssistedThrottleState::Manual;
                ControlHandler::PathFollower
            }
            FlightMode::PositionHold | FlightMode::Land | FlightMode::AutoTakeoff => {
                assist = assist_for(position, mode, &mode_settings, &stabilization);
                if assist != FlightModeAssist::None {
                    throttle_state = default_throttle(assist);
                }
                ControlHandler::PathFollower
            }
            FlightMode::CourseLock
            | FlightMode::PositionRoam
            | FlightMode::HomeLeash
            | FlightMode::AbsolutePosition
            | FlightMode::ReturnToBase
            | FlightMode::Poi
            | FlightMode::AutoCruise => ControlHandler::PathFollower,
            FlightMode::PathPlanner => ControlHandler::PathPlanner,
        };

        let accessory = registry.accessory.get();
        let switch = mode_settings
            .always_stabilize_when_armed_switch
            .and_then(|channel| accessory.0.get(channel as usize).copied());
        let always_stabilize = match switch {
            Some(value) if value <= -ALWAYS_STABILIZE_ACCESSORY_THRESHOLD => false,
            Some(value)
                if value >= ALWAYS_STABILIZE_ACCESSORY_THRESHOLD
                    && command.throttle
                        >= mode_settings.always_stabilize_when_armed_throttle_threshold =>
            {
                true
            }
            Some(_) => status.always_stabilize_when_armed,
            None => false,
        };

        let next = FlightStatus {
            armed: status.armed,
            flight_mode: mode,
            control_chain: handler.control_chain(),
            always_stabilize_when_armed: always_stabilize,
            flight_mode_assist: assist,
            assisted_control_state: control_state,
            assisted_throttle_state: throttle_state,
        };

        let newinit = self.first_run
            || next.flight_mode != status.flight_mode
            || next.always_stabilize_when_armed != status.always_stabilize_when_armed
            || next.flight_mode_assist != status.flight_mode_assist
            || next.assisted_control_state != status.assisted_control_state
            || next.assisted_throttle_state != status.assisted_throttle_state;

        if newinit {
            if next.flight_mode != status.flight_mode {
                info!("{}: Flight mode {:?} -> {:?}", ID, status.flight_mode, mode);
            }
            self.first_run = false;
            self.last_position = position;

            // Arming is owned elsewhere, so only the arbitrated fields are written
            registry.flight_status.modify(|s| {
                s.flight_mode = next.flight_mode;
                s.control_chain = next.control_chain;
                s.always_stabilize_when_armed = next.always_stabilize_when_armed;
                s.flight_mode_assist = next.flight_mode_assist;
                s.assisted_control_state = next.assisted_control_state;
                s.assisted_throttle_state = next.assisted_throttle_state;
            });
        }

        match handler {
            // Flown by the stabilization loops straight from the sticks
            ControlHandler::Manual | ControlHandler::Stabilized => {}
            ControlHandler::PathFollower => {
                self.path_follower.path_follower(newinit, registry, now)
            }
            ControlHandler::PathPlanner => self.path_follower.path_planner(newinit, registry),
        }

        Arbitration { handler, newinit }
    }
}

pub async fn main(registry: &'static Registry) -> ! {
    info!("{}: Task started", ID);

    let mut arbiter = FlightModeArbiter::new();
    let mut ticker = Ticker::every(Duration::from_millis(MANUAL_CONTROL_PERIOD_MS));

    info!("{}: Entering main loop", ID);
    loop {
        arbiter.tick(registry, Instant::now());
        ticker.next().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::FlightModeAssistMap;
    use crate::types::flight_mode::ControlChain;
    use crate::types::guidance::PathMode;
    use crate::types::status::AlarmSeverity;

    fn select(registry: &Registry, position: u8) {
        registry
            .manual_control
            .modify(|c| c.flight_mode_switch_position = position);
    }

    #[test]
    fn first_tick_commits() {
        let registry = Registry::new();
        let mut arbiter = FlightModeArbiter::new();

        let result = arbiter.tick(&registry, Instant::from_secs(1));
        assert!(result.newinit);
        assert_eq!(result.handler, ControlHandler::Stabilized);
        assert_eq!(
            registry.flight_status.get().control_chain,
            ControlChain::STABILIZATION
        );

        let result = arbiter.tick(&registry, Instant::from_secs(2));
        assert!(!result.newinit);
    }

    #[test]
    fn switch_selects_mode_and_chain() {
        let registry = Registry::new();
        let mut arbiter = FlightModeArbiter::new();
        arbiter.tick(&registry, Instant::from_secs(1));

        select(&registry, 3);
        let result = arbiter.tick(&registry, Instant::from_secs(2));
        assert!(result.newinit);
        assert_eq!(result.handler, ControlHandler::PathFollower);

        let status = registry.flight_status.get();
        assert_eq!(status.flight_mode, FlightMode::PositionHold);
        assert!(status.control_chain.contains(ControlChain::PATH_FOLLOWER));
        assert_eq!(registry.guidance_target.get().mode, PathMode::GotoEndpoint);

        // Out of range positions keep the current mode
        select(&registry, 17);
        let result = arbiter.tick(&registry, Instant::from_secs(3));
        assert!(!result.newinit);
        assert_eq!(registry.flight_status.get().flight_mode, FlightMode::PositionHold);
    }

    #[test]
    fn auto_takeoff_ignored_while_armed() {
        let registry = Registry::new();
        registry.flight_mode_settings.modify(|s| {
            s.flight_mode_position[4] = FlightMode::AutoTakeoff;
        });
        registry.flight_status.modify(|s| s.armed = true);

        let mut arbiter = FlightModeArbiter::new();
        select(&registry, 1);
        arbiter.tick(&registry, Instant::from_secs(1));
        assert_eq!(registry.flight_status.get().flight_mode, FlightMode::Stabilized2);

        select(&registry, 4);
        arbiter.tick(&registry, Instant::from_secs(2));
        assert_eq!(registry.flight_status.get().flight_mode, FlightMode::Stabilized2);
        assert!(registry.flight_status.get().armed);
    }

    #[test]
    fn assisted_stabilized_brakes_on_release() {
        let registry = Registry::new();
        registry
            .stabilization_settings
            .modify(|s| s.flight_mode_assist_map[0] = FlightModeAssistMap::GpsAssist);
        registry.manual_control.modify(|c| {
            c.roll = 0.4;
            c.thrust = 0.5;
        });

        let mut arbiter = FlightModeArbiter::new();
        let result = arbiter.tick(&registry, Instant::from_secs(1));
        assert_eq!(result.handler, ControlHandler::Stabilized);
        assert_eq!(
            registry.flight_status.get().flight_mode_assist,
            FlightModeAssist::GpsAssist
        );

        registry.manual_control.modify(|c| c.roll = 0.0);
        let result = arbiter.tick(&registry, Instant::from_secs(2));
        assert!(result.newinit);
        assert_eq!(result.handler, ControlHandler::PathFollower);

        let status = registry.flight_status.get();
        assert_eq!(status.assisted_control_state, AssistedControlState::Brake);
        assert_eq!(status.assisted_throttle_state, AssistedThrottleState::Auto);
        assert_eq!(registry.guidance_target.get().mode, PathMode::Brake);
    }

    #[test]
    fn mode_change_resets_assist() {
        let registry = Registry::new();
        registry
            .stabilization_settings
            .modify(|s| s.flight_mode_assist_map[0] = FlightModeAssistMap::GpsAssist);
        registry.manual_control.modify(|c| c.thrust = 0.5);

        let mut arbiter = FlightModeArbiter::new();
        arbiter.tick(&registry, Instant::from_secs(1));
        assert_eq!(
            registry.flight_status.get().assisted_control_state,
            AssistedControlState::Brake
        );

        select(&registry, 4);
        arbiter.tick(&registry, Instant::from_secs(2));
        let status = registry.flight_status.get();
        assert_eq!(status.flight_mode, FlightMode::ReturnToBase);
        assert_eq!(status.flight_mode_assist, FlightModeAssist::None);
        assert_eq!(status.assisted_control_state, AssistedControlState::Primary);
        assert_eq!(status.assisted_throttle_state, AssistedThrottleState::Manual);
    }

    #[test]
    fn always_stabilize_accessory() {
        let registry = Registry::new();
        registry.flight_mode_settings.modify(|s| {
            s.always_stabilize_when_armed_switch = Some(2);
            s.always_stabilize_when_armed_throttle_threshold = 0.1;
        });

        let mut arbiter = FlightModeArbiter::new();
        registry.accessory.modify(|a| a.0[2] = 0.5);
        registry.manual_control.modify(|c| c.throttle = 0.0);
        arbiter.tick(&registry, Instant::from_secs(1));
        assert!(!registry.flight_status.get().always_stabilize_when_armed);

        registry.manual_control.modify(|c| c.throttle = 0.2);
        arbiter.tick(&registry, Instant::from_secs(2));
        assert!(registry.flight_status.get().always_stabilize_when_armed);

        // Within the threshold nothing changes
        registry.accessory.modify(|a| a.0[2] = 0.0);
        arbiter.tick(&registry, Instant::from_secs(3));
        assert!(registry.flight_status.get().always_stabilize_when_armed);

        registry.accessory.modify(|a| a.0[2] = -0.5);
        arbiter.tick(&registry, Instant::from_secs(4));
        assert!(!registry.flight_status.get().always_stabilize_when_armed);
    }

    #[test]
    fn rejected_settings_keep_last_valid_record() {
        let registry = Registry::new();
        registry
            .flight_mode_settings
            .modify(|s| s.flight_mode_position[0] = FlightMode::PositionRoam);
        registry.flight_status.modify(|s| s.armed = true);

        let mut arbiter = FlightModeArbiter::new();
        arbiter.tick(&registry, Instant::from_secs(1));
        assert_eq!(registry.alarms.get().settings, AlarmSeverity::Ok);

        registry
            .flight_mode_settings
            .modify(|s| s.position_hold_offset.horizontal = 0.0);
        registry.manual_control.modify(|c| c.roll = 0.8);
        for tick in 1..=20u64 {
            arbiter.tick(&registry, Instant::from_millis(1000 + 20 * tick));
            let target = registry.guidance_target.get();
            for point in [target.start, target.end] {
                assert!(point.north.is_finite() && point.east.is_finite() && point.down.is_finite());
            }
        }

        assert_eq!(registry.flight_status.get().flight_mode, FlightMode::PositionRoam);
        assert_eq!(
            registry.flight_mode_settings.get().position_hold_offset.horizontal,
            10.0
        );
        assert_eq!(registry.alarms.get().settings, AlarmSeverity::Error);

        // The next valid record clears the alarm
        registry.flight_mode_settings.modify(|s| s.landing_velocity = 0.8);
        arbiter.tick(&registry, Instant::from_millis(1500));
        assert_eq!(registry.alarms.get().settings, AlarmSeverity::Ok);
    }

    #[test]
    fn battery_failsafe_moves_switch() {
        let registry = Registry::new();
        registry.flight_mode_settings.modify(|s| {
            s.battery_failsafe_debounce_ms = 1000;
            s.battery_failsafe_switch_positions.critical = Some(5);
        });

        let mut arbiter = FlightModeArbiter::new();
        arbiter.tick(&registry, Instant::from_secs(1));

        registry.flight_status.modify(|s| s.armed = true);
        registry.alarms.modify(|a| a.battery = AlarmSeverity::Critical);
        arbiter.tick(&registry, Instant::from_millis(1500));
        assert_eq!(registry.flight_status.get().flight_mode, FlightMode::Stabilized1);

        arbiter.tick(&registry, Instant::from_millis(2000));
        assert_eq!(registry.flight_status.get().flight_mode, FlightMode::Land);
        assert_eq!(registry.guidance_target.get().mode, PathMode::Land);
    }
}

//! Assisted control of the stabilized modes. Releasing the sticks brakes the
//! vehicle and then holds position, with thrust optionally managed by the
//! path follower.

use crate::types::config::{
    FlightModeAssistMap, FlightModeSettings, StabilizationSettings, ThrustLimits, ThrustMode,
};
use crate::types::control::ManualControlCommand;
use crate::types::flight_mode::{
    AssistedControlState, AssistedThrottleState, FlightMode, FlightModeAssist,
};

/// Band around the neutral thrust in which the pilot may take over thrust
const NEUTRAL_THROTTLE_RANGE_FACTOR: f32 = 0.2;
const BRAKE_THRUST_DEADBAND_FACTOR_LO: f32 = 0.96;
const BRAKE_THRUST_DEADBAND_FACTOR_HI: f32 = 1.04;

/// Assist variant of a flight mode at a given switch position.
pub fn assist_for(
    position: u8,
    mode: FlightMode,
    mode_settings: &FlightModeSettings,
    stabilization: &StabilizationSettings,
) -> FlightModeAssist {
    if mode == FlightMode::AutoTune {
        return FlightModeAssist::None;
    }

    let Some(map) = stabilization.flight_mode_assist_map.get(position as usize) else {
        return FlightModeAssist::None;
    };

    match map {
        FlightModeAssistMap::None => FlightModeAssist::None,
        FlightModeAssistMap::GpsAssist => {
            let thrust_mode = match mode {
                FlightMode::PositionHold | FlightMode::VelocityRoam => ThrustMode::AltitudeVario,
                _ => mode
                    .stabilization_bank()
                    .and_then(|bank| mode_settings.stabilization_thrust.get(bank).copied())
                    .unwrap_or(ThrustMode::CruiseControl),
            };

            match thrust_mode {
                ThrustMode::AltitudeHold | ThrustMode::AltitudeVario => {
                    FlightModeAssist::GpsAssistPrimaryThrust
                }
                ThrustMode::Manual | ThrustMode::CruiseControl => FlightModeAssist::GpsAssist,
            }
        }
    }
}

/// Throttle state the path follower starts with in an assisted mode.
pub const fn default_throttle(assist: FlightModeAssist) -> AssistedThrottleState {
    match assist {
        FlightModeAssist::GpsAssist => AssistedThrottleState::Auto,
        FlightModeAssist::GpsAssistPrimaryThrust | FlightModeAssist::None => {
            AssistedThrottleState::Manual
        }
    }
}

/// Next assisted sub-states, and whether the path follower flies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssistDecision {
    pub control_state: AssistedControlState,
    pub throttle_state: AssistedThrottleState,
    pub path_follower: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssistedControl {
    thrust_lo: f32,
    thrust_hi: f32,
}

crate::const_default!(
    AssistedControl => {
        thrust_lo: 0.0,
        thrust_hi: 0.0,
    }
);

impl AssistedControl {
    pub const fn new() -> Self {
        Self::const_default()
    }

    /// Thrust band recorded when the brake started.
    pub fn brake_deadband(&self) -> (f32, f32) {
        (self.thrust_lo, self.thrust_hi)
    }

    /// Transition the assisted sub-states of an assisted stabilized mode.
    pub fn update(
        &mut self,
        assist: FlightModeAssist,
        control_state: AssistedControlState,
        throttle_state: AssistedThrottleState,
        command: &ManualControlCommand,
        limits: &ThrustLimits,
        neutral_thrust_offset: f32,
    ) -> AssistDecision {
        let stick_input = command.roll_pitch_has_input();

        let neutral = limits.neutral + neutral_thrust_offset;
        let range = neutral * NEUTRAL_THROTTLE_RANGE_FACTOR;
        let throttle_neutral = command.thrust > neutral - range && command.thrust < neutral + range;

        let thrust_mode = default_throttle(assist);

        let primary = AssistDecision {
            control_state: AssistedControlState::Primary,
            throttle_state: AssistedThrottleState::Manual,
            path_follower: false,
        };

        match control_state {
            AssistedControlState::Primary if stick_input => primary,
            AssistedControlState::Primary => {
                self.thrust_lo = BRAKE_THRUST_DEADBAND_FACTOR_LO * command.thrust;
                self.thrust_hi = BRAKE_THRUST_DEADBAND_FACTOR_HI * command.thrust;

                // Auto thrust is meant to settle a hover, not to lift off from idle
                let throttle_state = if command.thrust < limits.min {
                    AssistedThrottleState::Manual
                } else {
                    thrust_mode
                };

                AssistDecision {
                    control_state: AssistedControlState::Brake,
                    throttle_state,
                    path_follower: true,
                }
            }
            AssistedControlState::Brake if stick_input => primary,
            AssistedControlState::Brake => {
                let outside = command.thrust < self.thrust_lo || command.thrust > self.thrust_hi;
                let throttle_state = if thrust_mode == AssistedThrottleState::Auto && outside {
                    AssistedThrottleState::Manual
                } else {
                    thrust_mode
                };

                AssistDecision {
                    control_state: AssistedControlState::Brake,
                    throttle_state,
                    path_follower: true,
                }
            }
            AssistedControlState::Hold if stick_input => primary,
            AssistedControlState::Hold => {
                let throttle_state = match (assist, throttle_state) {
                    (FlightModeAssist::GpsAssist, AssistedThrottleState::Auto) if throttle_neutral => {
                        AssistedThrottleState::AutoOverride
                    }
                    (FlightModeAssist::GpsAssist, AssistedThrottleState::Auto) => {
                        AssistedThrottleState::Auto
                    }
                    (FlightModeAssist::GpsAssist, AssistedThrottleState::AutoOverride)
                        if throttle_neutral =>
                    {
                        AssistedThrottleState::AutoOverride
                    }
                    // Once manual, auto thrust needs a fresh entry of the mode
                    _ => AssistedThrottleState::Manual,
                };

                AssistDecision {
                    control_state: AssistedControlState::Hold,
                    throttle_state,
                    path_follower: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ThrustLimits {
        ThrustLimits {
            min: 0.2,
            neutral: 0.5,
            max: 0.9,
        }
    }

    fn sticks(roll: f32, thrust: f32) -> ManualControlCommand {
        ManualControlCommand {
            roll,
            thrust,
            ..ManualControlCommand::const_default()
        }
    }

    fn hold(
        control: &mut AssistedControl,
        throttle: AssistedThrottleState,
        thrust: f32,
    ) -> AssistedThrottleState {
        control
            .update(
                FlightModeAssist::GpsAssist,
                AssistedControlState::Hold,
                throttle,
                &sticks(0.0, thrust),
                &limits(),
                0.0,
            )
            .throttle_state
    }

    #[test]
    fn released_sticks_brake() {
        let mut control = AssistedControl::new();
        let decision = control.update(
            FlightModeAssist::GpsAssist,
            AssistedControlState::Primary,
            AssistedThrottleState::Manual,
            &sticks(0.0, 0.5),
            &limits(),
            0.0,
        );
        assert_eq!(decision.control_state, AssistedControlState::Brake);
        assert_eq!(decision.throttle_state, AssistedThrottleState::Auto);
        assert!(decision.path_follower);

        let (lo, hi) = control.brake_deadband();
        assert!((lo - 0.48).abs() < 1e-6);
        assert!((hi - 0.52).abs() < 1e-6);

        // Leaving the band during the brake gives thrust back to the pilot
        let decision = control.update(
            FlightModeAssist::GpsAssist,
            AssistedControlState::Brake,
            AssistedThrottleState::Auto,
            &sticks(0.0, 0.55),
            &limits(),
            0.0,
        );
        assert_eq!(decision.throttle_state, AssistedThrottleState::Manual);
    }

    #[test]
    fn idle_thrust_brakes_with_manual_throttle() {
        let mut control = AssistedControl::new();
        let decision = control.update(
            FlightModeAssist::GpsAssist,
            AssistedControlState::Primary,
            AssistedThrottleState::Manual,
            &sticks(0.0, 0.1),
            &limits(),
            0.0,
        );
        assert_eq!(decision.control_state, AssistedControlState::Brake);
        assert_eq!(decision.throttle_state, AssistedThrottleState::Manual);
    }

    #[test]
    fn stick_input_returns_to_primary() {
        let mut control = AssistedControl::new();
        for state in [
            AssistedControlState::Primary,
            AssistedControlState::Brake,
            AssistedControlState::Hold,
        ] {
            let decision = control.update(
                FlightModeAssist::GpsAssist,
                state,
                AssistedThrottleState::Auto,
                &sticks(0.3, 0.5),
                &limits(),
                0.0,
            );
            assert_eq!(decision.control_state, AssistedControlState::Primary);
            assert_eq!(decision.throttle_state, AssistedThrottleState::Manual);
            assert!(!decision.path_follower);
        }
    }

    #[test]
    fn override_is_one_way() {
        let mut control = AssistedControl::new();

        // Outside of the neutral band auto thrust stays
        let mut throttle = hold(&mut control, AssistedThrottleState::Auto, 0.1);
        assert_eq!(throttle, AssistedThrottleState::Auto);

        throttle = hold(&mut control, throttle, 0.5);
        assert_eq!(throttle, AssistedThrottleState::AutoOverride);

        throttle = hold(&mut control, throttle, 0.8);
        assert_eq!(throttle, AssistedThrottleState::Manual);

        // Back in the neutral band the pilot keeps thrust
        for thrust in [0.5, 0.45, 0.1, 0.5] {
            throttle = hold(&mut control, throttle, thrust);
            assert_eq!(throttle, AssistedThrottleState::Manual);
        }
    }

    #[test]
    fn neutral_band_follows_learned_offset() {
        let mut control = AssistedControl::new();
        let decision = control.update(
            FlightModeAssist::GpsAssist,
            AssistedControlState::Hold,
            AssistedThrottleState::Auto,
            &sticks(0.0, 0.75),
            &limits(),
            0.2,
        );
        assert_eq!(decision.throttle_state, AssistedThrottleState::AutoOverride);
    }

    #[test]
    fn assist_from_switch_position() {
        let mut stabilization = StabilizationSettings::const_default();
        let mut modes = FlightModeSettings::const_default();
        stabilization.flight_mode_assist_map[0] = FlightModeAssistMap::GpsAssist;
        modes.stabilization_thrust[1] = ThrustMode::AltitudeVario;

        assert_eq!(
            assist_for(0, FlightMode::Stabilized1, &modes, &stabilization),
            FlightModeAssist::GpsAssist
        );
        assert_eq!(
            assist_for(0, FlightMode::Stabilized2, &modes, &stabilization),
            FlightModeAssist::GpsAssistPrimaryThrust
        );
        assert_eq!(
            assist_for(0, FlightMode::PositionHold, &modes, &stabilization),
            FlightModeAssist::GpsAssistPrimaryThrust
        );
        assert_eq!(
            assist_for(0, FlightMode::AutoTune, &modes, &stabilization),
            FlightModeAssist::None
        );
        assert_eq!(
            assist_for(1, FlightMode::Stabilized1, &modes, &stabilization),
            FlightModeAssist::None
        );
        assert_eq!(
            assist_for(9, FlightMode::Stabilized1, &modes, &stabilization),
            FlightModeAssist::None
        );
    }
}
